//! Encode synthetic streams, decode the result, and check the two agree.

use bytes::Bytes;
use mrx::{
    decode, dotted_hex, labels, stream_key, Configuration, DecoderConfig, EncoderConfig,
    FrameRate, ManifestDocument, MemoryStreams, MrxEncoder, PartitionKind, PartitionPack,
    RandomIndexPack, Rational, SingleStream, StreamProperties, UniversalLabel,
};
use pretty_assertions::assert_eq;
use std::io::Cursor;

fn frames(prefix: &str, count: usize) -> Vec<Bytes> {
    (0..count)
        .map(|i| Bytes::from(format!("{} frame {}", prefix, i)))
        .collect()
}

/// Streams 0 (25 fps) and 1 (50 fps) are clocked, stream 2 is static.
fn configuration() -> Configuration {
    let mut configuration = Configuration::default();
    configuration.stream_properties.insert(
        1,
        StreamProperties {
            frame_rate: Some(FrameRate::Clocked(Rational::new(50, 1))),
            ..Default::default()
        },
    );
    configuration.stream_properties.insert(
        2,
        StreamProperties {
            frame_rate: Some(FrameRate::Static),
            stream_type: Some("text".to_string()),
            ..Default::default()
        },
    );
    configuration
}

async fn encode(source: &mut MemoryStreams) -> (Vec<u8>, mrx::EncodeSummary) {
    let mut out = Vec::new();
    let summary = MrxEncoder::new(&mut out, EncoderConfig::default())
        .encode(source)
        .await
        .unwrap();
    (out, summary)
}

fn pack_at(data: &[u8], offset: usize) -> PartitionPack {
    let mut key = [0u8; 16];
    key.copy_from_slice(&data[offset..offset + 16]);
    let key = UniversalLabel::new(key);
    assert!(key.is_partition_pack(), "no partition pack at {}", offset);
    assert_eq!(data[offset + 16], 0x83);
    let len = u32::from_be_bytes([0, data[offset + 17], data[offset + 18], data[offset + 19]]) as usize;
    PartitionPack::parse(&key, &data[offset + 20..offset + 20 + len]).unwrap()
}

#[tokio::test]
async fn test_round_trip() {
    let mut source = MemoryStreams::new(configuration());
    source.push_stream(frames("slow", 5)).unwrap();
    source.push_stream(frames("fast", 10)).unwrap();
    source.push_stream(frames("clip", 3)).unwrap();

    let (data, summary) = encode(&mut source).await;
    assert_eq!(summary.bytes_written, data.len() as u64);

    let layout = decode(Cursor::new(data.clone()), &DecoderConfig::default())
        .await
        .unwrap();
    assert!(layout.warnings.is_empty());

    let kinds: Vec<PartitionKind> = layout.partitions.iter().map(|p| p.partition_type).collect();
    assert_eq!(
        kinds,
        vec![
            PartitionKind::Header,
            PartitionKind::Body,
            PartitionKind::Body,
            PartitionKind::Body,
            PartitionKind::Footer
        ]
    );
    assert!(layout.partitions[0].header_length > PartitionPack::header().size() as u64);

    // One base tick: one slow frame, two fast frames.
    let slow = dotted_hex(&stream_key(0, true).unwrap());
    let fast = dotted_hex(&stream_key(1, true).unwrap());
    let clip = dotted_hex(&stream_key(2, false).unwrap());
    let body = &layout.partitions[1];
    assert_eq!(body.content_package_count, 5);
    for package in &body.content_packages {
        let keys: Vec<&str> = package.items.iter().map(|i| i.key.as_str()).collect();
        assert_eq!(keys, vec![slow.as_str(), fast.as_str(), fast.as_str()]);
    }
    assert_eq!(
        body.content_packages[0].items[0].symbol.as_deref(),
        Some("FrameWrappedISXDData")
    );

    let generic = &layout.partitions[2];
    let item = &generic.content_packages[0].items[0];
    assert_eq!(item.key, clip);
    assert_eq!(item.symbol.as_deref(), Some("ClipWrappedISXDData"));
    let clip_len: usize = frames("clip", 3).iter().map(|f| f.len()).sum();
    assert_eq!(item.length, clip_len as u64);

    let manifest_item = &layout.partitions[3].content_packages[0].items[0];
    assert_eq!(manifest_item.key, dotted_hex(&labels::GENERIC_STREAM_DATA_ELEMENT));

    // Stream count and key order survive the trip.
    let mut keys: Vec<String> = Vec::new();
    for partition in &layout.partitions[..3] {
        for item in partition.content_packages.iter().flat_map(|p| p.items.iter()) {
            if !keys.contains(&item.key) {
                keys.push(item.key.clone());
            }
        }
    }
    assert_eq!(keys, vec![slow, fast, clip]);

    // The RIP points at every partition pack.
    let rip = RandomIndexPack::parse_trailing(&data).unwrap();
    assert_eq!(rip, summary.rip);
    assert_eq!(rip.entries.len(), 5);
    let sids: Vec<u32> = rip.entries.iter().map(|e| e.body_sid).collect();
    assert_eq!(sids, vec![0, 1, 2, 3, 0]);
    let mut previous = 0;
    for entry in &rip.entries {
        let pack = pack_at(&data, entry.byte_offset as usize);
        assert_eq!(pack.this_partition, entry.byte_offset);
        assert_eq!(pack.previous_partition, previous);
        assert_eq!(pack.body_sid, entry.body_sid);
        previous = entry.byte_offset;
    }
    let footer = pack_at(&data, rip.entries[4].byte_offset as usize);
    assert_eq!(footer.footer_partition, rip.entries[4].byte_offset);
}

#[tokio::test]
async fn test_embedded_manifest() {
    let mut source = MemoryStreams::new(configuration());
    source.push_stream(frames("slow", 2)).unwrap();
    source.push_stream(frames("fast", 4)).unwrap();
    source.push_stream(frames("clip", 1)).unwrap();

    let (data, summary) = encode(&mut source).await;
    let manifest = summary.manifest.unwrap();

    let streams = &manifest.manifest.data_streams;
    assert_eq!(streams.len(), 3);
    assert_eq!(
        streams.iter().map(|s| s.clocked).collect::<Vec<_>>(),
        vec![true, true, false]
    );
    assert_eq!(streams[2].stream_type, "text");
    assert_eq!(streams[1].frame_rate, FrameRate::Clocked(Rational::new(50, 1)));
    assert_eq!(manifest.manifest.umid, summary.umid);

    // The manifest KLV holds the same document.
    let json = manifest.to_json().unwrap();
    let needle = json.as_bytes();
    assert!(data.windows(needle.len()).any(|w| w == needle));
    assert_eq!(ManifestDocument::from_json(&json).unwrap(), manifest);
}

#[tokio::test]
async fn test_previous_manifest_becomes_history() {
    let mut first = MemoryStreams::new(configuration());
    for prefix in ["a", "b", "c"] {
        first.push_stream(frames(prefix, 1)).unwrap();
    }
    let (_, summary) = encode(&mut first).await;
    let previous = summary.manifest.unwrap();

    let mut second = MemoryStreams::new(configuration()).with_previous_manifest(previous.clone());
    for prefix in ["a", "b", "c"] {
        second.push_stream(frames(prefix, 1)).unwrap();
    }
    let (_, summary) = encode(&mut second).await;
    let manifest = summary.manifest.unwrap();

    assert_eq!(manifest.manifest.history.len(), 1);
    assert_eq!(manifest.manifest.history[0].umid, previous.manifest.umid);
    assert_ne!(manifest.manifest.umid, previous.manifest.umid);
}

#[tokio::test]
async fn test_primary_stream_ending_drops_the_rest() {
    let mut configuration = configuration();
    configuration.stream_properties.remove(&2);

    let mut source = MemoryStreams::new(configuration);
    source.push_stream(frames("slow", 2)).unwrap();
    source.push_stream(frames("fast", 10)).unwrap();

    let (data, _) = encode(&mut source).await;
    let layout = decode(Cursor::new(data), &DecoderConfig::default()).await.unwrap();

    let fast = dotted_hex(&stream_key(1, true).unwrap());
    let written = layout.partitions[1]
        .content_packages
        .iter()
        .flat_map(|p| p.items.iter())
        .filter(|item| item.key == fast)
        .count();
    assert_eq!(written, 4);
}

#[tokio::test]
async fn test_single_stream_unclocked() {
    let mut configuration = Configuration::default();
    configuration.default_stream_properties.frame_rate = Some(FrameRate::Static);

    let data: Vec<u8> = (0..100u8).collect();
    let mut source = SingleStream::new(Cursor::new(data.clone()), 16, configuration);

    let config = EncoderConfig {
        write_manifest: false,
        ..EncoderConfig::default()
    };
    let mut out = Vec::new();
    let summary = MrxEncoder::new(&mut out, config).encode(&mut source).await.unwrap();
    assert!(summary.manifest.is_none());
    assert_eq!(summary.rip.entries.len(), 3);

    let layout = decode(Cursor::new(out), &DecoderConfig::default()).await.unwrap();
    assert_eq!(layout.partitions.len(), 3);
    let item = &layout.partitions[1].content_packages[0].items[0];
    assert_eq!(item.length, 100);
}

#[tokio::test]
async fn test_no_streams() {
    let mut source = MemoryStreams::new(Configuration::default());
    let mut out = Vec::new();
    let err = MrxEncoder::new(&mut out, EncoderConfig::default())
        .encode(&mut source)
        .await
        .unwrap_err();
    assert!(matches!(err, mrx::MrxError::Config(_)));
}
