// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::net::Ipv4Addr;

use netwarden::{
    models::{
        device::{DeviceStatus, DeviceType, DeviceUpdate, NewDevice},
        job::JobStatus,
        profile::CredentialProfileUpdate,
    },
    store::Stores,
};
use serde_json::json;
use serial_test::serial;
use uuid::Uuid;

use crate::integration_tests::common;

fn sample_device(profile: Uuid, job: Option<Uuid>, last_octet: u8) -> NewDevice {
    NewDevice {
        hostname: format!("host-{last_octet}"),
        ip_address: Ipv4Addr::new(10, 77, 0, last_octet),
        device_type: DeviceType::Linux,
        os_info: json!({"os": "Linux"}),
        credential_profile_id: profile,
        discovered_by_job: job,
        status: DeviceStatus::Online,
    }
}

#[tokio::test]
#[serial]
async fn profile_crud_is_owner_scoped() {
    let Some(pool) = common::connect().await else { return };
    let stores = Stores::new(pool.clone());
    let owner = common::new_owner(&pool).await;
    let stranger = common::new_owner(&pool).await;

    let id = common::create_profile(&stores, owner, 22).await;

    // Reads join through the owner; strangers see nothing.
    let mine = stores
        .profiles
        .get_for_owner(id, owner)
        .await
        .expect("get")
        .expect("visible to owner");
    assert_eq!(mine.owner_id, owner);
    assert_eq!(mine.port, 22);
    assert!(
        stores
            .profiles
            .get_for_owner(id, stranger)
            .await
            .expect("get")
            .is_none()
    );

    // Partial update touches only the named fields.
    let updated = stores
        .profiles
        .update(
            id,
            owner,
            &CredentialProfileUpdate {
                name: Some("renamed".to_string()),
                port: Some(2222),
                ..Default::default()
            },
        )
        .await
        .expect("update");
    assert!(updated);
    let mine = stores
        .profiles
        .get_for_owner(id, owner)
        .await
        .expect("get")
        .expect("still visible");
    assert_eq!(mine.name, "renamed");
    assert_eq!(mine.port, 2222);
    assert_eq!(mine.username, "u");

    // A stranger's update must report "no such row".
    let foreign = stores
        .profiles
        .update(
            id,
            stranger,
            &CredentialProfileUpdate {
                name: Some("stolen".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect("update");
    assert!(!foreign);

    // The tri-state private key: set, then clear.
    let with_key = CredentialProfileUpdate {
        private_key: Some(Some("key-ciphertext".to_string())),
        ..Default::default()
    };
    assert!(stores.profiles.update(id, owner, &with_key).await.expect("update"));
    assert!(
        stores
            .profiles
            .get_for_owner(id, owner)
            .await
            .expect("get")
            .expect("visible")
            .private_key
            .is_some()
    );
    let clear_key = CredentialProfileUpdate {
        private_key: Some(None),
        ..Default::default()
    };
    assert!(stores.profiles.update(id, owner, &clear_key).await.expect("update"));
    assert!(
        stores
            .profiles
            .get_for_owner(id, owner)
            .await
            .expect("get")
            .expect("visible")
            .private_key
            .is_none()
    );

    assert!(stores.profiles.delete(id, owner).await.expect("delete"));
    assert!(!stores.profiles.delete(id, owner).await.expect("second delete"));
}

#[tokio::test]
#[serial]
async fn profile_delete_is_restricted_while_referenced() {
    let Some(pool) = common::connect().await else { return };
    let stores = Stores::new(pool.clone());
    let owner = common::new_owner(&pool).await;
    let profile = common::create_profile(&stores, owner, 22).await;

    stores
        .devices
        .insert_discovered(&sample_device(profile, None, 1))
        .await
        .expect("insert device");

    let res = stores.profiles.delete(profile, owner).await;
    assert!(res.is_err(), "delete must be restricted while devices reference it");

    // Visible and intact afterwards.
    assert!(
        stores
            .profiles
            .get_for_owner(profile, owner)
            .await
            .expect("get")
            .is_some()
    );
}

#[tokio::test]
#[serial]
async fn job_rows_follow_the_state_machine() {
    let Some(pool) = common::connect().await else { return };
    let stores = Stores::new(pool.clone());
    let owner = common::new_owner(&pool).await;
    let stranger = common::new_owner(&pool).await;
    let profile = common::create_profile(&stores, owner, 22).await;

    let id = stores
        .jobs
        .create("scan", "10.0.0.0/30", profile, owner)
        .await
        .expect("create job");

    let job = stores
        .jobs
        .get_for_owner(id, owner)
        .await
        .expect("get")
        .expect("visible");
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.target_range, "10.0.0.0/30");
    assert_eq!(job.created_by, owner);
    assert!(job.started_at.is_none());
    assert!(job.completed_at.is_none());

    // Owner scoping on reads.
    assert!(
        stores
            .jobs
            .get_for_owner(id, stranger)
            .await
            .expect("get")
            .is_none()
    );

    // pending -> running happens exactly once.
    assert!(stores.jobs.set_running(id).await.expect("set_running"));
    assert!(!stores.jobs.set_running(id).await.expect("set_running twice"));
    let job = stores
        .jobs
        .get_for_owner(id, owner)
        .await
        .expect("get")
        .expect("visible");
    assert_eq!(job.status, JobStatus::Running);
    assert!(job.started_at.is_some());

    // running -> completed rewrites the summary and stamps completed_at.
    let summary = json!({"totalIpsScanned": 2, "devicesDiscovered": 0, "devices": []});
    assert!(stores.jobs.set_completed(id, &summary).await.expect("complete"));
    let job = stores
        .jobs
        .get_for_owner(id, owner)
        .await
        .expect("get")
        .expect("visible");
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.results, Some(summary));
    assert!(job.completed_at.is_some());

    // Terminal rows accept nothing further.
    assert!(!stores.jobs.set_running(id).await.expect("terminal"));
    assert!(!stores.jobs.set_failed(id, &json!({"error": "x"})).await.expect("terminal"));
    let marker = json!({"cancelled": true, "cancelled_at": "2026-01-01T00:00:00Z"});
    assert!(!stores.jobs.cancel(id, owner, &marker).await.expect("terminal"));
}

#[tokio::test]
#[serial]
async fn cancellation_marker_survives_a_draining_scan() {
    let Some(pool) = common::connect().await else { return };
    let stores = Stores::new(pool.clone());
    let owner = common::new_owner(&pool).await;
    let profile = common::create_profile(&stores, owner, 22).await;

    let id = stores
        .jobs
        .create("scan", "10.0.0.0/30", profile, owner)
        .await
        .expect("create job");
    assert!(stores.jobs.set_running(id).await.expect("running"));

    let marker = json!({"cancelled": true, "cancelled_at": "2026-01-01T00:00:00Z"});
    assert!(stores.jobs.cancel(id, owner, &marker).await.expect("cancel"));

    // The drained pipeline tries to finish afterwards; the conditional
    // write must drop its summary.
    let late = json!({"totalIpsScanned": 2, "devicesDiscovered": 1, "devices": ["h"]});
    assert!(!stores.jobs.set_completed(id, &late).await.expect("late complete"));

    let job = stores
        .jobs
        .get_for_owner(id, owner)
        .await
        .expect("get")
        .expect("visible");
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.results, Some(marker));
}

#[tokio::test]
#[serial]
async fn cancel_from_pending_skips_running() {
    let Some(pool) = common::connect().await else { return };
    let stores = Stores::new(pool.clone());
    let owner = common::new_owner(&pool).await;
    let profile = common::create_profile(&stores, owner, 22).await;

    let id = stores
        .jobs
        .create("scan", "10.0.0.0/30", profile, owner)
        .await
        .expect("create job");
    let marker = json!({"cancelled": true, "cancelled_at": "2026-01-01T00:00:00Z"});
    assert!(stores.jobs.cancel(id, owner, &marker).await.expect("cancel"));

    // The pipeline must now refuse to start.
    assert!(!stores.jobs.set_running(id).await.expect("set_running"));

    // Terminal rows always carry both lifecycle stamps.
    let job = stores
        .jobs
        .get_for_owner(id, owner)
        .await
        .expect("get")
        .expect("visible");
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.started_at.is_some());
    assert!(job.completed_at.is_some());
}

#[tokio::test]
#[serial]
async fn device_upsert_refreshes_instead_of_duplicating() {
    let Some(pool) = common::connect().await else { return };
    let stores = Stores::new(pool.clone());
    let owner = common::new_owner(&pool).await;
    let profile = common::create_profile(&stores, owner, 22).await;

    let first = stores
        .devices
        .insert_discovered(&sample_device(profile, None, 9))
        .await
        .expect("insert");

    let mut rescan = sample_device(profile, None, 9);
    rescan.hostname = "renamed-host".to_string();
    let second = stores
        .devices
        .insert_discovered(&rescan)
        .await
        .expect("re-insert");

    assert_eq!(first, second, "the profile/ip key must map to one row");
    let all = stores.devices.list_for_owner(owner).await.expect("list");
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].hostname, "renamed-host");
    assert!(all[0].last_seen.is_some());
}

#[tokio::test]
#[serial]
async fn device_reads_and_writes_are_owner_scoped() {
    let Some(pool) = common::connect().await else { return };
    let stores = Stores::new(pool.clone());
    let owner = common::new_owner(&pool).await;
    let stranger = common::new_owner(&pool).await;
    let profile = common::create_profile(&stores, owner, 22).await;

    let id = stores
        .devices
        .insert_discovered(&sample_device(profile, None, 20))
        .await
        .expect("insert");

    assert!(stores.devices.get_for_owner(id, owner).await.expect("get").is_some());
    assert!(stores.devices.get_for_owner(id, stranger).await.expect("get").is_none());
    assert!(stores.devices.list_for_owner(stranger).await.expect("list").is_empty());

    // Foreign writes report "no such row", never forbidden.
    assert!(
        !stores
            .devices
            .set_status(id, DeviceStatus::Offline, stranger)
            .await
            .expect("foreign set_status")
    );
    assert!(!stores.devices.delete(id, stranger).await.expect("foreign delete"));

    // The owner's writes land.
    assert!(
        stores
            .devices
            .set_status(id, DeviceStatus::Offline, owner)
            .await
            .expect("set_status")
    );
    let by_status = stores
        .devices
        .list_for_owner_by_status(DeviceStatus::Offline, owner)
        .await
        .expect("by status");
    assert_eq!(by_status.len(), 1);
    assert_eq!(by_status[0].id, id);

    let patched = stores
        .devices
        .update(
            id,
            owner,
            &DeviceUpdate {
                hostname: Some("edge-router".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect("update");
    assert!(patched);
    let device = stores
        .devices
        .get_for_owner(id, owner)
        .await
        .expect("get")
        .expect("visible");
    assert_eq!(device.hostname, "edge-router");
    assert_eq!(device.status, DeviceStatus::Offline);
    assert_eq!(device.device_type, DeviceType::Linux);

    assert!(stores.devices.delete(id, owner).await.expect("delete"));
    assert!(stores.devices.get_for_owner(id, owner).await.expect("get").is_none());
}

#[tokio::test]
#[serial]
async fn device_search_matches_hostname_and_ip_text() {
    let Some(pool) = common::connect().await else { return };
    let stores = Stores::new(pool.clone());
    let owner = common::new_owner(&pool).await;
    let stranger = common::new_owner(&pool).await;
    let profile = common::create_profile(&stores, owner, 22).await;

    let mut a = sample_device(profile, None, 30);
    a.hostname = "edge-router".to_string();
    let mut b = sample_device(profile, None, 31);
    b.hostname = "db-primary".to_string();
    stores.devices.insert_discovered(&a).await.expect("insert");
    stores.devices.insert_discovered(&b).await.expect("insert");

    let by_name = stores.devices.search("EDGE", owner).await.expect("search");
    assert_eq!(by_name.len(), 1);
    assert_eq!(by_name[0].hostname, "edge-router");

    let by_ip = stores.devices.search("10.77.0.3", owner).await.expect("search");
    assert_eq!(by_ip.len(), 2);

    assert!(stores.devices.search("edge", stranger).await.expect("search").is_empty());
}
