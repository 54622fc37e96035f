use bytes::Bytes;
use futures::stream;
use ldm_datasets::{ByteStream, NewImage};
use ldm_storage::StorageError;

/// Generate deterministic test data using a seeded pseudo-random generator.
#[allow(dead_code)]
pub fn seeded_bytes(seed: u64, len: usize) -> Bytes {
    let mut state = seed;
    let data: Vec<u8> = (0..len)
        .map(|_| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
            (state >> 33) as u8
        })
        .collect();
    Bytes::from(data)
}

/// A stream that yields `chunk` then fails, as an interrupted upload would.
#[allow(dead_code)]
pub fn failing_stream(chunk: Bytes) -> ByteStream {
    Box::pin(stream::iter(vec![
        Ok(chunk),
        Err(StorageError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "client went away",
        ))),
    ]))
}

#[allow(dead_code)]
pub fn new_image(image_id: &str, sample_id: i64) -> NewImage {
    NewImage {
        image_id: image_id.to_string(),
        sample_id,
        image_no: 0,
        image_code: Some("front".to_string()),
        original_filename: Some(format!("{image_id}.png")),
        image_scheme: Some("png".to_string()),
    }
}
