//! Integration tests for the streaming decoder.

mod common;

use common::{data_key, sample_file, FileBuilder};
use mrx::{
    decode, decode_to_string, decode_with, labels, DecoderConfig, EssenceRegistry,
    EssenceResolver, IndexValue, MrxError, OutputFormat, PartitionKind, PartitionPack,
    SKIP_MARKER_KEY,
};
use pretty_assertions::assert_eq;
use std::io::{self, Cursor};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

fn config(divisor: usize) -> DecoderConfig {
    DecoderConfig {
        chunk_divisor: divisor,
        ..DecoderConfig::default()
    }
}

#[tokio::test]
async fn test_chunk_size_does_not_change_the_document() {
    let data = sample_file(40);

    let mut documents = Vec::new();
    for divisor in [1, 10, 1000, 1_000_000] {
        let document = decode_to_string(Cursor::new(data.clone()), &config(divisor))
            .await
            .unwrap();
        documents.push(document);
    }

    for document in &documents[1..] {
        assert_eq!(document, &documents[0]);
    }
}

#[tokio::test]
async fn test_minimal_file() {
    let mut file = FileBuilder::new();
    file.partition(PartitionPack::header(), &[], &[]);
    file.partition(PartitionPack::body(1), &[], &[]);
    file.essence(data_key(1), &[1; 4])
        .essence(data_key(2), &[2; 5])
        .essence(data_key(3), &[3; 6]);
    file.partition(PartitionPack::footer(), &[], &[]);
    let data = file.finish();

    let layout = decode(Cursor::new(data), &DecoderConfig::default()).await.unwrap();
    assert!(layout.warnings.is_empty());

    let kinds: Vec<PartitionKind> = layout.partitions.iter().map(|p| p.partition_type).collect();
    assert_eq!(
        kinds,
        vec![PartitionKind::Header, PartitionKind::Body, PartitionKind::Footer]
    );
    let counts: Vec<u64> = layout.partitions.iter().map(|p| p.content_package_count).collect();
    assert_eq!(counts, vec![0, 1, 0]);

    let body = &layout.partitions[1];
    let package = &body.content_packages[0];
    assert_eq!(package.items.len(), 3);
    assert_eq!(package.items[0].key, "060e2b34.01020101.0d010301.17010101");
    assert_eq!(package.items[0].symbol.as_deref(), Some("GCDataItem"));
    assert_eq!(package.items[1].length, 5);
    assert_eq!(package.items[2].total_byte_count, 16 + 1 + 6);
    assert_eq!(body.essence_byte_count, 3 * 17 + 4 + 5 + 6);

    // Offsets are where each record starts.
    assert_eq!(package.items[1].file_offset, package.items[0].file_offset + 21);

    // KAG 1: the pack's own size minus one is folded in.
    let pack_size = PartitionPack::body(1).size() as u64;
    assert_eq!(body.header_length, pack_size);

    // One package: statistics are reported but zeroed.
    let stats = body.content_package_statistics.unwrap();
    assert_eq!(stats.count, 1);
    assert_eq!(stats.mean, 0.0);
    assert!(layout.partitions[0].content_package_statistics.is_none());
}

#[tokio::test]
async fn test_header_metadata_and_index_table() {
    let layout = decode(Cursor::new(sample_file(10)), &DecoderConfig::default())
        .await
        .unwrap();

    let header = &layout.partitions[0];
    assert_eq!(header.content_package_count, 0);
    assert!(header.warning.is_none());

    let body = &layout.partitions[1];
    assert_eq!(body.content_package_count, 10);
    let index = body.index_table.as_ref().unwrap();
    assert_eq!(index["IndexEditRate"], IndexValue::Text("25/1".into()));
    assert_eq!(index["IndexDuration"], IndexValue::Signed(40));
    assert_eq!(index["BodySID"], IndexValue::Unsigned(1));
    // Primers are per partition and the body has none.
    assert_eq!(index["Tag8001"], IndexValue::Text("aabb".into()));
}

#[tokio::test]
async fn test_fill_items_are_skipped_but_counted() {
    let mut file = FileBuilder::new();
    file.partition(PartitionPack::header(), &[], &[]);
    file.partition(PartitionPack::body(1), &[], &[]);
    file.essence(data_key(1), &[0; 4]);
    file.fill(100);
    file.essence(data_key(2), &[0; 4]);
    let data = file.finish();

    let layout = decode(Cursor::new(data), &DecoderConfig::default()).await.unwrap();
    let items = &layout.partitions[1].content_packages[0].items;
    assert_eq!(items.len(), 2);
    assert_eq!(items[1].file_offset - items[0].file_offset, 21 + 16 + 1 + 100);
    assert_eq!(layout.partitions[1].essence_byte_count, 42);
}

#[tokio::test]
async fn test_statistics_over_packages() {
    let mut file = FileBuilder::new();
    file.partition(PartitionPack::body(1), &[], &[]);
    // Package lengths 20, 30 and 40 bytes.
    for value in [3usize, 13, 23] {
        file.essence(data_key(1), &vec![0; value]);
    }
    let data = file.finish();

    let layout = decode(Cursor::new(data), &DecoderConfig::default()).await.unwrap();
    let stats = layout.partitions[0].content_package_statistics.unwrap();
    assert_eq!(stats.count, 3);
    assert_eq!(stats.mean, 30.0);
    assert_eq!(stats.minimum, 20);
    assert_eq!(stats.maximum, 40);
}

#[tokio::test]
async fn test_truncated_value() {
    let mut data = sample_file(3);
    let rip_len = mrx::RandomIndexPack::parse_trailing(&data).unwrap().to_vec().unwrap().len();
    data.truncate(data.len() - rip_len);
    // Re-append the last essence KLV one byte short.
    data.extend(mrx::Klv::new(data_key(9), vec![0u8; 50]).to_vec());
    data.pop();

    for divisor in [1, 1_000_000] {
        let err = decode(Cursor::new(data.clone()), &config(divisor)).await.unwrap_err();
        assert!(
            matches!(err, MrxError::StreamTruncated { expected_remaining: 1 }),
            "divisor {}: {:?}",
            divisor,
            err
        );
    }
}

/// Serves `data` in one read, then fails every read after it.
struct BrokenSource {
    data: Option<Vec<u8>>,
}

impl AsyncRead for BrokenSource {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.data.take() {
            Some(data) => {
                buf.put_slice(&data);
                Poll::Ready(Ok(()))
            }
            None => Poll::Ready(Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))),
        }
    }
}

#[tokio::test]
async fn test_read_failure_wins_over_truncation() {
    // Stops inside the first partition pack, which the decoder sees as truncation.
    let data = sample_file(2)[..40].to_vec();
    let err = decode(BrokenSource { data: Some(data) }, &DecoderConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, MrxError::IoFailure { .. }), "{:?}", err);
}

#[tokio::test]
async fn test_huge_declared_length() {
    let mut data = PartitionPack::body(1).to_vec().unwrap();
    data.extend_from_slice(&data_key(1));
    data.extend_from_slice(&[0x88, 0, 0, 0x01, 0, 0, 0, 0, 0]);
    data.extend_from_slice(&[0u8; 10]);

    let err = decode(Cursor::new(data), &DecoderConfig::default())
        .await
        .unwrap_err();
    assert!(
        matches!(err, MrxError::StreamTruncated { expected_remaining } if expected_remaining == (1u64 << 40) - 10),
        "{:?}",
        err
    );
}

#[tokio::test]
async fn test_index_table_missing() {
    let mut pack = PartitionPack::body(1);
    pack.index_byte_count = 100;
    let data = pack.to_vec().unwrap();

    let err = decode(Cursor::new(data), &DecoderConfig::default())
        .await
        .unwrap_err();
    assert!(
        matches!(
            err,
            MrxError::StreamInterrupted {
                section: "index table",
                expected: 100,
                consumed: 0
            }
        ),
        "{:?}",
        err
    );
}

#[tokio::test]
async fn test_empty_input() {
    let err = decode(Cursor::new(Vec::new()), &DecoderConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, MrxError::EmptyStream));
}

#[tokio::test]
async fn test_missing_rip_is_a_warning() {
    let mut file = FileBuilder::new();
    file.partition(PartitionPack::header(), &[], &[]);
    let data = file.finish_without_rip();

    let layout = decode(Cursor::new(data), &DecoderConfig::default()).await.unwrap();
    assert_eq!(layout.warnings, vec![mrx::MISSING_RIP.to_string()]);
    assert_eq!(layout.partitions.len(), 1);
}

#[tokio::test]
async fn test_essence_in_header_partition() {
    let mut file = FileBuilder::new();
    file.partition(PartitionPack::header(), &[], &[]);
    file.essence(data_key(1), &[1; 8]);
    file.partition(PartitionPack::footer(), &[], &[]);
    let data = file.finish();

    let layout = decode(Cursor::new(data), &DecoderConfig::default()).await.unwrap();
    assert_eq!(
        layout.partitions[0].warning.as_deref(),
        Some(mrx::ESSENCE_IN_HEADER)
    );
    assert!(layout.partitions[1].warning.is_none());
}

#[tokio::test]
async fn test_kag_other_than_one() {
    let mut pack = PartitionPack::body(1);
    pack.kag_size = 512;
    let mut file = FileBuilder::new();
    file.partition(pack, &common::header_metadata(), &[]);
    let data = file.finish();

    let layout = decode(Cursor::new(data), &DecoderConfig::default()).await.unwrap();
    let expected = 512 + common::header_metadata().len() as u64;
    assert_eq!(layout.partitions[0].header_length, expected);
}

#[tokio::test]
async fn test_content_package_limits() {
    let config = DecoderConfig {
        content_package_limits: vec![2, 3],
        ..DecoderConfig::default()
    };
    let layout = decode(Cursor::new(sample_file(20)), &config).await.unwrap();

    let body = &layout.partitions[1];
    assert_eq!(body.content_package_count, 20);
    assert_eq!(body.content_packages.len(), 2 + 1 + 3);

    let marker = &body.content_packages[2].items[0];
    assert_eq!(marker.key, SKIP_MARKER_KEY);
    assert_eq!(marker.total_container_count, Some(15));
    assert!(marker.symbol.is_none());

    let skipped: u64 = (2..17)
        .map(|i| {
            let size = 10 + (i * 37) % 300;
            (16 + mrx::ber::encoded_len(size as u64) as u64 + size as u64)
                + (16 + mrx::ber::encoded_len((size / 2) as u64) as u64 + (size / 2) as u64)
                + (16 + 1 + 3)
        })
        .sum();
    assert_eq!(marker.total_byte_count, skipped);
}

#[tokio::test]
async fn test_unknown_keys_share_one_resolver() {
    let mut file = FileBuilder::new();
    file.partition(PartitionPack::body(1), &[], &[]);
    file.essence([0x11; 16], &[0; 2]).essence([0x22; 16], &[0; 2]).essence([0x11; 16], &[0; 2]);
    let data = file.finish();

    let mut resolver = EssenceResolver::new(Arc::new(EssenceRegistry::new()));
    let layout = decode_with(Cursor::new(data), &DecoderConfig::default(), &mut resolver)
        .await
        .unwrap();

    let symbols: Vec<String> = layout.partitions[0]
        .content_packages
        .iter()
        .flat_map(|p| p.items.iter())
        .map(|item| item.symbol.clone().unwrap())
        .collect();
    assert_eq!(symbols, vec!["SystemItemTBD0", "SystemItemTBD1", "SystemItemTBD0"]);
    assert_eq!(resolver.unknown_count(), 2);
}

#[tokio::test]
async fn test_json_output() {
    let config = DecoderConfig {
        output_format: OutputFormat::Json,
        ..DecoderConfig::default()
    };
    let document = decode_to_string(Cursor::new(sample_file(2)), &config).await.unwrap();
    let value: serde_json::Value = serde_json::from_str(&document).unwrap();
    assert_eq!(value["Partitions"][1]["PartitionType"], "body");
    assert_eq!(value["Partitions"][1]["ContentPackageCount"], 2);
    assert!(value.get("Warnings").is_none());
}

#[tokio::test]
async fn test_partition_after_rip_is_ignored() {
    let mut file = FileBuilder::new();
    file.partition(PartitionPack::header(), &[], &[]);
    let mut data = file.finish();
    data.extend(PartitionPack::footer().to_vec().unwrap());
    data.extend(mrx::Klv::new(labels::ISXD_DATA_ELEMENT, vec![0; 4]).to_vec());

    let layout = decode(Cursor::new(data), &DecoderConfig::default()).await.unwrap();
    assert_eq!(layout.partitions.len(), 1);
}
