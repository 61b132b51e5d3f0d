#![no_main]
use libfuzzer_sys::fuzz_target;
use zerofree::core::superblock::parse_group_descriptors;
use zerofree::Superblock;

// Arbitrary bytes must never panic the superblock or descriptor parsers
fuzz_target!(|data: &[u8]| {
    if data.len() < 1024 {
        return;
    }

    let Ok(superblock) = Superblock::from_bytes(&data[..1024]) else {
        return;
    };

    let table = &data[1024..];
    if let Ok(descriptors) = parse_group_descriptors(&superblock, table) {
        for (group, desc) in descriptors.iter().enumerate() {
            let range = superblock.group_range(group as u64);
            assert!(range.start < range.end);

            for used in superblock.group_metadata(group as u64, desc) {
                assert!(used.end <= superblock.blocks_count);
            }
        }
    }
});
