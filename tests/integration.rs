//! End-to-end tests driving the public `Fs`/`RegularFile` API (spec §8).

use std::sync::Arc;

use slicefs::{format, BlockDevice, Error, Fs, FormatOptions, MemDevice, MAX_FILE_SIZE, SMALL_THRESHOLD};

/// Wraps a `MemDevice` behind `Arc` so the same backing storage can be
/// mounted, dropped, and re-mounted, modeling unmount/remount without the
/// crate needing to hand back ownership of the device.
struct SharedDevice(Arc<MemDevice>);

impl BlockDevice for SharedDevice {
    fn read_block(&self, n: u32) -> slicefs::Result<[u8; slicefs::BLOCK]> {
        self.0.read_block(n)
    }
    fn write_block(&self, n: u32, data: &[u8; slicefs::BLOCK]) -> slicefs::Result<()> {
        self.0.write_block(n, data)
    }
}

fn new_image(nr_blocks: u32, nr_inodes: u32) -> Arc<MemDevice> {
    let dev = Arc::new(MemDevice::new(nr_blocks));
    format(dev.as_ref(), FormatOptions::new(nr_blocks, nr_inodes)).unwrap();
    dev
}

fn mount(dev: &Arc<MemDevice>) -> Arc<Fs> {
    Fs::mount(Box::new(SharedDevice(dev.clone()))).unwrap()
}

fn payload(n: usize) -> Vec<u8> {
    vec![b'a'; n]
}

#[test]
fn scenario_1_small_write_reopen_read() {
    let image = new_image(64, 32);
    let fs = mount(&image);
    let f = fs.create(0o644).unwrap();
    let ino = f.ino();
    f.write(0, &payload(50)).unwrap();
    drop(f);

    let f2 = fs.open(ino, false).unwrap();
    let mut buf = [0u8; 50];
    assert_eq!(f2.read(0, &mut buf).unwrap(), 50);
    assert_eq!(&buf[..], &payload(50)[..]);
}

#[test]
fn scenario_2_large_write_reopen_read() {
    let image = new_image(64, 32);
    let fs = mount(&image);
    let f = fs.create(0o644).unwrap();
    let ino = f.ino();
    // Past SMALL_THRESHOLD (3968), so this actually takes the large path.
    f.write(0, &payload(4000)).unwrap();
    drop(f);

    let f2 = fs.open(ino, false).unwrap();
    let mut buf = [0u8; 4000];
    assert_eq!(f2.read(0, &mut buf).unwrap(), 4000);
    assert_eq!(&buf[..], &payload(4000)[..]);
}

#[test]
fn scenario_3_write_then_append_same_size_small() {
    let image = new_image(64, 32);
    let fs = mount(&image);
    let f = fs.create(0o644).unwrap();
    f.write(0, &payload(50)).unwrap();
    f.append(&payload(50)).unwrap();

    let mut buf = [0u8; 100];
    f.read(0, &mut buf).unwrap();
    assert_eq!(&buf[..], &payload(100)[..]);
}

#[test]
fn scenario_4_write_then_larger_append_small() {
    let image = new_image(64, 32);
    let fs = mount(&image);
    let f = fs.create(0o644).unwrap();
    f.write(0, &payload(50)).unwrap();
    f.append(&payload(200)).unwrap();

    let mut buf = [0u8; 250];
    f.read(0, &mut buf).unwrap();
    assert_eq!(&buf[..], &payload(250)[..]);
}

#[test]
fn scenario_5_append_reslices_run() {
    let image = new_image(64, 32);
    let fs = mount(&image);
    let f = fs.create(0o644).unwrap();
    f.write(0, &payload(100)).unwrap();
    f.append(&payload(100)).unwrap();

    let mut buf = [0u8; 200];
    f.read(0, &mut buf).unwrap();
    assert_eq!(&buf[..], &payload(200)[..]);
}

#[test]
fn scenario_6_append_past_threshold_migrates() {
    let image = new_image(64, 32);
    let fs = mount(&image);
    let f = fs.create(0o644).unwrap();
    // 3000 <= SMALL_THRESHOLD (3968) stays small; appending 1000 more pushes
    // the total past the threshold and forces a migration to large.
    f.write(0, &payload(3000)).unwrap();
    f.append(&payload(1000)).unwrap();
    assert_eq!(f.size(), 4000);

    let mut buf = [0u8; 4000];
    f.read(0, &mut buf).unwrap();
    assert_eq!(&buf[..], &payload(4000)[..]);
}

#[test]
fn scenario_7_reopen_with_truncate_small() {
    let image = new_image(64, 32);
    let fs = mount(&image);
    let f = fs.create(0o644).unwrap();
    let ino = f.ino();
    f.write(0, &payload(200)).unwrap();
    drop(f);

    let f2 = fs.open(ino, true).unwrap();
    assert_eq!(f2.size(), 0);
    f2.write(0, &payload(100)).unwrap();

    let mut buf = [0u8; 100];
    f2.read(0, &mut buf).unwrap();
    assert_eq!(&buf[..], &payload(100)[..]);
}

#[test]
fn scenario_8_reopen_with_truncate_large() {
    let image = new_image(64, 32);
    let fs = mount(&image);
    let f = fs.create(0o644).unwrap();
    let ino = f.ino();
    // Past SMALL_THRESHOLD (3968), so this actually takes the large path.
    f.write(0, &payload(4000)).unwrap();
    drop(f);

    let f2 = fs.open(ino, true).unwrap();
    assert_eq!(f2.size(), 0);
    f2.write(0, &payload(250)).unwrap();

    let mut buf = [0u8; 250];
    f2.read(0, &mut buf).unwrap();
    assert_eq!(&buf[..], &payload(250)[..]);
}

#[test]
fn persists_across_unmount_and_remount() {
    let image = new_image(64, 32);
    let ino;
    {
        let fs = mount(&image);
        let f = fs.create(0o644).unwrap();
        ino = f.ino();
        f.write(0, &payload(60)).unwrap();
        f.append(&payload(40)).unwrap();
        f.sync(true).unwrap();
    }

    let fs2 = mount(&image);
    let f2 = fs2.open(ino, false).unwrap();
    assert_eq!(f2.size(), 100);
    let mut buf = [0u8; 100];
    f2.read(0, &mut buf).unwrap();
    assert_eq!(&buf[..], &payload(100)[..]);
}

#[test]
fn write_at_exact_threshold_stays_small() {
    let image = new_image(64, 32);
    let fs = mount(&image);
    let f = fs.create(0o644).unwrap();
    f.write(0, &payload(SMALL_THRESHOLD as usize)).unwrap();
    assert_eq!(f.size(), SMALL_THRESHOLD);

    let stats = fs.stats().unwrap();
    assert_eq!(stats.small_files, 1);
}

#[test]
fn write_one_byte_past_threshold_goes_large() {
    let image = new_image(512, 32);
    let fs = mount(&image);
    let f = fs.create(0o644).unwrap();
    f.write(0, &payload(SMALL_THRESHOLD as usize + 1)).unwrap();

    let stats = fs.stats().unwrap();
    assert_eq!(stats.small_files, 0);
    assert_eq!(stats.files, 1);
}

#[test]
fn write_past_max_file_size_fails_with_too_large() {
    let image = new_image(4200, 32);
    let fs = mount(&image);
    let f = fs.create(0o644).unwrap();
    let err = f.write(MAX_FILE_SIZE, &payload(1)).unwrap_err();
    assert!(matches!(err, Error::TooLarge));
}

#[test]
fn sparse_write_reads_zeros_in_gap_across_mount() {
    let image = new_image(4200, 32);
    let fs = mount(&image);
    let f = fs.create(0o644).unwrap();
    f.write(5000, &payload(10)).unwrap();

    let mut buf = vec![0u8; 5010];
    f.read(0, &mut buf).unwrap();
    assert!(buf[..5000].iter().all(|&b| b == 0));
    assert_eq!(&buf[5000..5010], &payload(10)[..]);
}

#[test]
fn truncate_to_zero_then_write_roundtrips() {
    let image = new_image(64, 32);
    let fs = mount(&image);
    let f = fs.create(0o644).unwrap();
    f.write(0, &payload(30)).unwrap();
    f.truncate(0).unwrap();

    let mut empty = [0u8; 1];
    assert_eq!(f.read(0, &mut empty).unwrap(), 0);

    f.write(0, &payload(20)).unwrap();
    let mut buf = [0u8; 20];
    f.read(0, &mut buf).unwrap();
    assert_eq!(&buf[..], &payload(20)[..]);
}

#[test]
fn statfs_reports_capacity() {
    let image = new_image(64, 32);
    let fs = mount(&image);
    let info = fs.statfs();
    assert_eq!(info.total_blocks, 64);
    assert_eq!(info.total_inodes, 32);
    assert!(info.free_blocks < 64);
}

#[test]
fn remove_reclaims_inode_and_blocks() {
    let image = new_image(64, 32);
    let fs = mount(&image);
    let f = fs.create(0o644).unwrap();
    let ino = f.ino();
    f.write(0, &payload(250)).unwrap();
    drop(f);

    let before = fs.statfs().free_inodes;
    fs.remove(ino).unwrap();
    let after = fs.statfs().free_inodes;
    assert_eq!(after, before + 1);
    assert!(fs.open(ino, false).is_ok(), "inode slot is still readable until reallocated");
}

#[test]
fn read_sliced_block_debug_channel_only_valid_for_small_files() {
    let image = new_image(512, 32);
    let fs = mount(&image);
    let small = fs.create(0o644).unwrap();
    small.write(0, &payload(10)).unwrap();
    assert!(fs.read_sliced_block(small.ino()).is_ok());

    let large = fs.create(0o644).unwrap();
    large.write(0, &payload(SMALL_THRESHOLD as usize + 1)).unwrap();
    assert!(fs.read_sliced_block(large.ino()).is_err());
}
