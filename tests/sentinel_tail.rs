use tempfile::tempdir;
use txnlog::{
    Event, LogFileWriter, LogSequentialReader, DEFAULT_MAX_FILE_SIZE, FILL_CHUNK, OP_EOF,
};

#[test]
fn tail_is_sentinel_filled_and_terminates_replay() {
    let dir = tempdir().expect("tempdir");
    let writer = LogFileWriter::create(dir.path(), 0, DEFAULT_MAX_FILE_SIZE).expect("writer");
    writer.put(1, 1, Event::from_body(&b"first"[..])).expect("put");
    writer.put(1, 2, Event::from_body(&b"second"[..])).expect("put");
    writer.commit(1, 3).expect("commit");
    let position = writer.position();
    writer.close();

    // The file grew by exactly one preallocation chunk and every byte past
    // the logical position is the sentinel.
    let bytes = std::fs::read(dir.path().join("log-0")).expect("read segment");
    assert_eq!(bytes.len(), FILL_CHUNK);
    assert!(position < bytes.len() as u64);
    assert!(bytes[position as usize..].iter().all(|&b| b == OP_EOF as u8));

    // Replay stops cleanly at the first sentinel byte.
    let mut seq = LogSequentialReader::open(dir.path(), 0).expect("sequential reader");
    let mut count = 0;
    while seq.next().expect("next").is_some() {
        count += 1;
    }
    assert_eq!(count, 3);
}

#[test]
fn preallocation_covers_oversized_frames() {
    let dir = tempdir().expect("tempdir");
    let writer = LogFileWriter::create(dir.path(), 0, DEFAULT_MAX_FILE_SIZE).expect("writer");
    // Larger than one fill chunk, so the writer must grow by several chunks
    // before a single append.
    let body = vec![7u8; FILL_CHUNK + FILL_CHUNK / 2];
    let ptr = writer.put(1, 1, Event::from_body(body.clone())).expect("put");
    writer.commit(1, 2).expect("commit");
    let position = writer.position();
    writer.close();

    let bytes = std::fs::read(dir.path().join("log-0")).expect("read segment");
    assert_eq!(bytes.len(), 2 * FILL_CHUNK);
    assert!(bytes[position as usize..].iter().all(|&b| b == OP_EOF as u8));

    let reader = txnlog::LogRandomReader::open(dir.path(), 0).expect("random reader");
    assert_eq!(reader.get(ptr.offset).expect("get").body, body);
    reader.close();
}
