//! Synthetic MRX file construction shared by the integration tests.

#![allow(dead_code)]

use mrx::{labels, write_local_set, Klv, PartitionPack, PrimerPack, RandomIndexPack, UL};

/// Generic container data element key with element number `n`.
pub fn data_key(n: u8) -> UL {
    [
        0x06, 0x0E, 0x2B, 0x34, 0x01, 0x02, 0x01, 0x01, 0x0D, 0x01, 0x03, 0x01, 0x17, 0x01, 0x01, n,
    ]
}

/// Builds a file partition by partition, keeping the RIP in step.
#[derive(Default)]
pub struct FileBuilder {
    bytes: Vec<u8>,
    rip: RandomIndexPack,
    previous: u64,
}

impl FileBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Append a partition pack followed by its header metadata and index bytes.
    pub fn partition(&mut self, mut pack: PartitionPack, metadata: &[u8], index: &[u8]) -> &mut Self {
        let offset = self.bytes.len() as u64;
        pack.this_partition = offset;
        pack.previous_partition = self.previous;
        pack.header_byte_count = metadata.len() as u64;
        pack.index_byte_count = index.len() as u64;
        self.rip.add_entry(pack.body_sid, offset);
        self.previous = offset;

        self.bytes.extend(pack.to_vec().unwrap());
        self.bytes.extend_from_slice(metadata);
        self.bytes.extend_from_slice(index);
        self
    }

    pub fn essence(&mut self, key: UL, value: &[u8]) -> &mut Self {
        self.bytes.extend(Klv::new(key, value.to_vec()).to_vec());
        self
    }

    pub fn fill(&mut self, size: usize) -> &mut Self {
        self.bytes.extend(Klv::new(labels::FILL_ITEMS[1], vec![0u8; size]).to_vec());
        self
    }

    pub fn finish(&mut self) -> Vec<u8> {
        let mut bytes = std::mem::take(&mut self.bytes);
        bytes.extend(self.rip.to_vec().unwrap());
        bytes
    }

    pub fn finish_without_rip(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.bytes)
    }
}

/// Header metadata: a primer pack and one opaque set.
pub fn header_metadata() -> Vec<u8> {
    let mut primer = PrimerPack::new();
    primer.add(0x8001, [0x06, 0x0E, 0x2B, 0x34, 0x01, 0x01, 0x01, 0x0E, 0x0F, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01]);
    let mut out = primer.to_klv().unwrap().to_vec();
    out.extend(Klv::new(labels::PREFACE, vec![0u8; 40]).to_vec());
    out
}

/// An index table segment with a few fields and one private tag.
pub fn index_segment() -> Vec<u8> {
    let mut value = Vec::new();
    write_local_set(&mut value, 0x3F0B, &[0, 0, 0, 25, 0, 0, 0, 1]).unwrap();
    write_local_set(&mut value, 0x3F0C, &0i64.to_be_bytes()).unwrap();
    write_local_set(&mut value, 0x3F0D, &40i64.to_be_bytes()).unwrap();
    write_local_set(&mut value, 0x3F06, &1u32.to_be_bytes()).unwrap();
    write_local_set(&mut value, 0x3F07, &1u32.to_be_bytes()).unwrap();
    write_local_set(&mut value, 0x8001, &[0xAA, 0xBB]).unwrap();
    Klv::new(labels::INDEX_TABLE_SEGMENT, value).to_vec()
}

/// Header (with metadata), one body of `packages` three-item packages with
/// an index table and fill, and a footer.
pub fn sample_file(packages: usize) -> Vec<u8> {
    let mut file = FileBuilder::new();
    file.partition(PartitionPack::header(), &header_metadata(), &[]);
    file.partition(PartitionPack::body(1), &[], &index_segment());
    for i in 0..packages {
        let size = 10 + (i * 37) % 300;
        file.essence(data_key(1), &vec![1u8; size])
            .essence(data_key(2), &vec![2u8; size / 2])
            .essence(data_key(3), &vec![3u8; 3]);
        if i % 7 == 0 {
            file.fill(5);
        }
    }
    file.partition(PartitionPack::footer(), &[], &[]);
    file.finish()
}
