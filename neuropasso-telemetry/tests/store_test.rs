use chrono::{Duration, Utc};
use neuropasso_telemetry::{decode_at, DecodeError, DeviceStateStore, DeviceStatus, LEFT_LEG, RIGHT_LEG};

fn apply(store: &DeviceStateStore, raw: &[u8]) -> Result<bool, DecodeError> {
    let reading = decode_at(raw, Utc::now())?;
    Ok(store.update(reading))
}

#[test]
fn test_decoded_frames_update_known_devices_only() {
    let store = DeviceStateStore::with_default_devices();

    assert_eq!(apply(&store, b"ESQ,30,100,200"), Ok(true));
    assert_eq!(apply(&store, b"XX,1,2,3"), Ok(false));
    assert_eq!(apply(&store, b"DIR,40,150,250"), Ok(true));
    assert!(apply(&store, b"ESQ,notanumber,1,2").is_err());

    let all = store.snapshot_all();
    assert_eq!(all.len(), 2);
    assert_eq!(all[LEFT_LEG].angle(), 30.0);
    assert_eq!(all[RIGHT_LEG].angle(), 40.0);
    assert_eq!(all[RIGHT_LEG].ecg(), 250);
}

#[test]
fn test_rejected_frame_leaves_previous_reading() {
    let store = DeviceStateStore::with_default_devices();
    apply(&store, b"DIR,12.5,7,8").unwrap();
    let before = store.snapshot(RIGHT_LEG).unwrap();

    assert!(matches!(apply(&store, b"DIR,1,2"), Err(DecodeError::MalformedFrame(_))));
    assert_eq!(store.snapshot(RIGHT_LEG).unwrap(), before);
}

#[test]
fn test_status_follows_fresh_readings() {
    let store = DeviceStateStore::with_default_devices();
    let now = Utc::now();

    let statuses = store.statuses(now, std::time::Duration::from_secs(1));
    assert_eq!(statuses[LEFT_LEG], DeviceStatus::Disconnected);

    let reading = decode_at(b"ESQ,5,1,1", now - Duration::milliseconds(200)).unwrap();
    store.update(reading);

    let statuses = store.statuses(now, std::time::Duration::from_secs(1));
    assert_eq!(statuses[LEFT_LEG], DeviceStatus::Connected);
    assert_eq!(statuses[RIGHT_LEG], DeviceStatus::Disconnected);
}
