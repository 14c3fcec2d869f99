use tempfile::tempdir;
use txnlog::{Checkpoint, Event, LogFileWriter, LogSequentialReader, DEFAULT_MAX_FILE_SIZE};

fn seed_segment(dir: &std::path::Path) -> Vec<u32> {
    let writer = LogFileWriter::create(dir, 0, DEFAULT_MAX_FILE_SIZE).expect("writer");
    let mut offsets = Vec::new();
    for i in 0..5u64 {
        let ptr = writer
            .put(i, i, Event::from_body(format!("event-{i}").into_bytes()))
            .expect("put");
        offsets.push(ptr.offset);
    }
    writer.commit(5, 5).expect("commit");
    writer
        .metadata()
        .mark_checkpoint(offsets[3] as u64, 50)
        .expect("checkpoint");
    writer.close();
    offsets
}

#[test]
fn usable_checkpoint_fast_forwards_replay() {
    let dir = tempdir().expect("tempdir");
    let offsets = seed_segment(dir.path());

    let mut seq = LogSequentialReader::open(dir.path(), 0).expect("sequential reader");
    assert_eq!(
        seq.last_checkpoint(),
        Checkpoint {
            offset: offsets[3] as u64,
            write_order_id: 50
        }
    );
    seq.skip_to_last_checkpoint_position(60).expect("skip");
    let entry = seq.next().expect("next").expect("record");
    assert_eq!(entry.offset, offsets[3] as u64);
    assert_eq!(entry.record.write_order_id, 3);
}

#[test]
fn stale_request_refuses_the_seek() {
    let dir = tempdir().expect("tempdir");
    let offsets = seed_segment(dir.path());
    assert!(offsets[0] == 0);

    // The sidecar is ahead of the requested write order: replay must start
    // from the beginning.
    let mut seq = LogSequentialReader::open(dir.path(), 0).expect("sequential reader");
    seq.skip_to_last_checkpoint_position(40).expect("skip");
    let entry = seq.next().expect("next").expect("record");
    assert_eq!(entry.offset, 0);
    assert_eq!(entry.record.write_order_id, 0);
}

#[test]
fn torn_checkpoint_write_recovers_the_previous_pair() {
    let dir = tempdir().expect("tempdir");
    let writer = LogFileWriter::create(dir.path(), 0, DEFAULT_MAX_FILE_SIZE).expect("writer");
    for i in 0..3u64 {
        writer.put(i, i, Event::from_body(&b"payload"[..])).expect("put");
    }
    writer.commit(3, 3).expect("commit");
    writer.metadata().mark_checkpoint(100, 50).expect("first checkpoint");
    writer.metadata().mark_checkpoint(200, 60).expect("second checkpoint");
    writer.close();

    // Corrupt the slot the second checkpoint landed in, simulating a crash
    // mid-write before it became durable.
    let meta_path = dir.path().join("log-0.meta");
    let mut bytes = std::fs::read(&meta_path).expect("read sidecar");
    // Header is 8 bytes, slots are 28; generation 3 lands in slot 1.
    bytes[8 + 28 + 5] ^= 0xFF;
    std::fs::write(&meta_path, &bytes).expect("rewrite sidecar");

    assert_eq!(
        txnlog::load_checkpoint(&meta_path).expect("load checkpoint"),
        Checkpoint {
            offset: 100,
            write_order_id: 50
        }
    );
}

#[test]
fn write_order_only_checkpoint_keeps_the_offset() {
    let dir = tempdir().expect("tempdir");
    let writer = LogFileWriter::create(dir.path(), 0, DEFAULT_MAX_FILE_SIZE).expect("writer");
    writer.put(1, 1, Event::from_body(&b"x"[..])).expect("put");
    writer.commit(1, 2).expect("commit");
    writer.mark_checkpoint(10).expect("checkpoint at position");
    let position = writer.position();
    writer
        .metadata()
        .mark_checkpoint_write_order_id(25)
        .expect("woid-only checkpoint");
    writer.close();

    let seq = LogSequentialReader::open(dir.path(), 0).expect("sequential reader");
    assert_eq!(
        seq.last_checkpoint(),
        Checkpoint {
            offset: position,
            write_order_id: 25
        }
    );
}
