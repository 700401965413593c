use bytes::BytesMut;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use stompwire::{Command, Frame, StompCodec};
use tokio_util::codec::{Decoder, Encoder};

/// Split `encoded` into random chunks of `1..max` bytes.
fn random_chunks(encoded: &[u8], rng: &mut StdRng, max: usize) -> Vec<Vec<u8>> {
    let mut chunks = Vec::new();
    let mut off = 0usize;
    while off < encoded.len() {
        let sz = rng.gen_range(1..max).min(encoded.len() - off);
        chunks.push(encoded[off..off + sz].to_vec());
        off += sz;
    }
    chunks
}

/// Feed `chunks` to a fresh decoder, collecting every decoded frame.
fn decode_all(chunks: Vec<Vec<u8>>) -> Vec<Frame> {
    let mut dec = StompCodec::new();
    let mut feed = BytesMut::new();
    let mut out = Vec::new();
    for c in chunks {
        feed.extend_from_slice(&c);
        loop {
            match dec.decode(&mut feed) {
                Ok(Some(f)) => out.push(f),
                Ok(None) => break,
                Err(e) => panic!("decoder error: {}", e),
            }
        }
    }
    out
}

/// Encode frames with random headers and bodies (binary included), feed
/// them back in random splits and check every frame survives intact apart
/// from the synthesized content headers.
#[test]
fn randomized_frames_survive_random_splits() {
    let mut rng = StdRng::from_seed([0x42; 32]);
    let mut codec = StompCodec::new();

    let mut originals = Vec::new();
    let mut encoded = BytesMut::new();
    for i in 0..50 {
        let mut frame = Frame::new(Command::Send).header("destination", format!("/queue/{}", i));
        for h in 0..rng.gen_range(0..4) {
            frame = frame.header(format!("x-key-{}", h), format!("v{}", rng.gen_range(0..1000)));
        }
        let body_len = rng.gen_range(0..64);
        let body: Vec<u8> = (0..body_len).map(|_| rng.r#gen::<u8>()).collect();
        frame = frame.set_body(body);

        codec.encode(frame.clone(), &mut encoded).expect("encode");
        originals.push(frame);
    }

    let decoded = decode_all(random_chunks(&encoded, &mut rng, 16));
    assert_eq!(decoded.len(), originals.len());

    for (got, want) in decoded.iter().zip(&originals) {
        assert_eq!(got.command, want.command);
        assert_eq!(got.body, want.body);
        assert_eq!(&got.headers[..want.headers.len()], &want.headers[..]);
        assert_eq!(
            got.get_header("content-length"),
            Some(want.body.len().to_string().as_str())
        );
        assert!(got.get_header("content-type").is_some());
    }
}

/// Feed a long stream containing many small frames, splitting randomly,
/// to ensure the decoder can sustain streaming workloads.
#[test]
fn streaming_many_small_frames() {
    let mut codec = StompCodec::new();
    let mut encoded = BytesMut::new();
    for i in 0..200 {
        let f = Frame::new(Command::Message)
            .header("message-id", i.to_string())
            .set_body(format!("msg-{}", i));
        codec.encode(f, &mut encoded).expect("encode");
        // brokers may pad between frames
        if i % 7 == 0 {
            encoded.extend_from_slice(b"\n");
        }
    }

    let mut rng = StdRng::from_seed([0x99; 32]);
    let decoded = decode_all(random_chunks(&encoded, &mut rng, 64));

    assert_eq!(decoded.len(), 200, "expected to decode 200 frames");
    for (i, f) in decoded.iter().enumerate() {
        assert_eq!(f.message_id(), Some(i.to_string().as_str()));
    }
}
