use anyhow::Result;
use chrono::{Datelike, TimeZone, Utc};
use std::fs;
use std::io::{Cursor, Seek, SeekFrom, Write};

use zipstow::zip::ZipParser;
use zipstow::{
    AccessMode, ArchiveOptions, CompressionMethod, EntryTimes, ErrorKind, ZipArchive, ZipFileEntry,
};

fn fixed_time() -> EntryTimes {
    EntryTimes::uniform(Utc.with_ymd_and_hms(2022, 8, 9, 10, 11, 12).unwrap())
}

/// Deterministic bytes that DEFLATE cannot shrink.
fn noise(len: usize) -> Vec<u8> {
    let mut state = 0x2545_F491_4F6C_DD1Du64;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state >> 24) as u8
        })
        .collect()
}

fn add_bytes<S: zipstow::ArchiveStream>(
    zip: &mut ZipArchive<S>,
    method: CompressionMethod,
    name: &str,
    data: &[u8],
) -> Result<ZipFileEntry> {
    let mut source = Cursor::new(data.to_vec());
    Ok(zip.add_stream(method, name, &mut source, fixed_time(), "")?)
}

fn memory_archive(files: &[(&str, &[u8])]) -> Result<Vec<u8>> {
    let mut zip = ZipArchive::create(Cursor::new(Vec::new()), "");
    for (name, data) in files {
        add_bytes(&mut zip, CompressionMethod::Deflate, name, data)?;
    }
    Ok(zip.finish()?.into_inner())
}

fn file_archive(path: &std::path::Path, files: &[(&str, &[u8])]) -> Result<()> {
    let mut zip = ZipArchive::create_file(path, "")?;
    for (name, data) in files {
        add_bytes(&mut zip, CompressionMethod::Deflate, name, data)?;
    }
    zip.close()?;
    Ok(())
}

#[test]
fn store_and_deflate_round_trip() -> Result<()> {
    let text = b"the quick brown fox jumps over the lazy dog\n".repeat(200);

    let mut zip = ZipArchive::create(Cursor::new(Vec::new()), "");
    let stored = add_bytes(&mut zip, CompressionMethod::Stored, "stored.txt", &text)?;
    let deflated = add_bytes(&mut zip, CompressionMethod::Deflate, "deflated.txt", &text)?;
    let bytes = zip.finish()?.into_inner();

    assert_eq!(stored.compression_method, CompressionMethod::Stored);
    assert_eq!(stored.compressed_size, text.len() as u32);
    assert_eq!(deflated.compression_method, CompressionMethod::Deflate);
    assert!(deflated.compressed_size < text.len() as u32 / 4);
    assert_eq!(stored.crc32, crc32fast::hash(&text));
    assert_eq!(deflated.crc32, crc32fast::hash(&text));

    let mut zip = ZipArchive::open(Cursor::new(bytes), AccessMode::Read)?;
    let entries = zip.read_central_dir()?;
    assert_eq!(entries.len(), 2);
    for entry in &entries {
        assert_eq!(entry.uncompressed_size, text.len() as u32);
        assert_eq!(entry.header_size, entry.data_offset - entry.lfh_offset);
        assert_eq!(zip.extract_to_vec(entry)?, text);
    }
    assert_eq!(entries[1].data_offset, stored.data_offset + stored.compressed_size + entries[1].header_size);
    Ok(())
}

#[test]
fn local_header_is_patched_with_final_values() -> Result<()> {
    let data = b"patched header contents".to_vec();
    let bytes = memory_archive(&[("p.txt", &data)])?;

    assert_eq!(&bytes[0..4], b"PK\x03\x04");
    let method = u16::from_le_bytes([bytes[8], bytes[9]]);
    let crc = u32::from_le_bytes(bytes[14..18].try_into()?);
    let uncompressed = u32::from_le_bytes(bytes[22..26].try_into()?);
    assert_eq!(method, 8);
    assert_eq!(crc, crc32fast::hash(&data));
    assert_eq!(uncompressed, data.len() as u32);
    Ok(())
}

#[test]
fn incompressible_data_falls_back_to_store() -> Result<()> {
    let data = noise(64 * 1024);

    let mut zip = ZipArchive::create(Cursor::new(Vec::new()), "");
    let entry = add_bytes(&mut zip, CompressionMethod::Deflate, "noise.bin", &data)?;
    let bytes = zip.finish()?.into_inner();

    assert_eq!(entry.compression_method, CompressionMethod::Stored);
    assert_eq!(entry.compressed_size, entry.uncompressed_size);
    // Nothing of the discarded DEFLATE attempt survives between payload and directory.
    let (eocd, _) = ZipParser::new(Cursor::new(&bytes))?.find_eocd()?;
    assert_eq!(eocd.cd_offset, entry.data_offset + entry.compressed_size);

    let mut zip = ZipArchive::open(Cursor::new(bytes), AccessMode::Read)?;
    let entries = zip.read_central_dir()?;
    assert_eq!(entries[0].compression_method, CompressionMethod::Stored);
    assert_eq!(zip.extract_to_vec(&entries[0])?, data);
    Ok(())
}

#[test]
fn forced_deflate_keeps_larger_payload() -> Result<()> {
    let data = noise(8 * 1024);

    let mut zip = ZipArchive::create(Cursor::new(Vec::new()), "");
    zip.set_options(ArchiveOptions::default().force_deflate(true));
    let entry = add_bytes(&mut zip, CompressionMethod::Deflate, "noise.bin", &data)?;
    let bytes = zip.finish()?.into_inner();

    assert_eq!(entry.compression_method, CompressionMethod::Deflate);
    assert!(entry.compressed_size > entry.uncompressed_size);

    let mut zip = ZipArchive::open(Cursor::new(bytes), AccessMode::Read)?;
    let entries = zip.read_central_dir()?;
    assert_eq!(zip.extract_to_vec(&entries[0])?, data);
    Ok(())
}

#[test]
fn forward_only_reader_is_not_rewound() -> Result<()> {
    let data = noise(4 * 1024);

    let mut zip = ZipArchive::create(Cursor::new(Vec::new()), "");
    let entry = zip.add_reader(
        CompressionMethod::Deflate,
        "piped.bin",
        &mut data.as_slice(),
        fixed_time(),
        "",
    )?;
    let bytes = zip.finish()?.into_inner();
    assert_eq!(entry.compression_method, CompressionMethod::Deflate);

    let mut zip = ZipArchive::open(Cursor::new(bytes), AccessMode::Read)?;
    let entries = zip.read_central_dir()?;
    assert_eq!(zip.extract_to_vec(&entries[0])?, data);
    Ok(())
}

#[test]
fn open_then_close_leaves_bytes_untouched() -> Result<()> {
    let mut zip = ZipArchive::create(Cursor::new(Vec::new()), "archive comment");
    add_bytes(&mut zip, CompressionMethod::Deflate, "a.txt", b"alpha")?;
    add_bytes(&mut zip, CompressionMethod::Stored, "b.txt", b"beta")?;
    let original = zip.finish()?.into_inner();

    let zip = ZipArchive::open(Cursor::new(original.clone()), AccessMode::Write)?;
    let reclosed = zip.finish()?.into_inner();
    assert_eq!(reclosed, original);

    let zip = ZipArchive::open(Cursor::new(original.clone()), AccessMode::Read)?;
    assert_eq!(zip.finish()?.into_inner(), original);
    Ok(())
}

#[test]
fn append_keeps_existing_entries() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("append.zip");
    file_archive(&path, &[("a", b"first"), ("b", b"second"), ("c", b"third")])?;

    let mut zip = ZipArchive::open_file(&path, AccessMode::Write)?;
    assert_eq!(zip.existing_entry_count(), 3);
    add_bytes(&mut zip, CompressionMethod::Deflate, "d", b"fourth")?;
    assert_eq!(zip.list()?.len(), 4);
    zip.close()?;

    let (eocd, _) = ZipParser::new(fs::File::open(&path)?)?.find_eocd()?;
    assert_eq!(eocd.total_entries, 4);

    let mut zip = ZipArchive::open_file(&path, AccessMode::Read)?;
    let entries = zip.read_central_dir()?;
    let names: Vec<_> = entries.iter().map(|e| e.file_name.as_str()).collect();
    assert_eq!(names, ["a", "b", "c", "d"]);
    let contents: Vec<_> = entries
        .iter()
        .map(|e| zip.extract_to_vec(e))
        .collect::<zipstow::Result<_>>()?;
    assert_eq!(
        contents,
        vec![b"first".to_vec(), b"second".to_vec(), b"third".to_vec(), b"fourth".to_vec()]
    );
    Ok(())
}

#[test]
fn comment_containing_trailer_signature() -> Result<()> {
    let comment = "release notes: PK\u{5}\u{6} is the trailer signature";
    let mut zip = ZipArchive::create(Cursor::new(Vec::new()), comment);
    add_bytes(&mut zip, CompressionMethod::Stored, "x", b"x")?;
    let bytes = zip.finish()?.into_inner();

    let mut zip = ZipArchive::open(Cursor::new(bytes), AccessMode::Read)?;
    assert_eq!(zip.comment(), comment);
    assert_eq!(zip.read_central_dir()?.len(), 1);
    Ok(())
}

#[test]
fn close_truncates_after_shorter_trailer() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("comment.zip");
    let mut zip = ZipArchive::create_file(&path, &"long comment ".repeat(50))?;
    add_bytes(&mut zip, CompressionMethod::Stored, "x", b"x")?;
    zip.close()?;
    let before = fs::metadata(&path)?.len();

    let mut zip = ZipArchive::open_file(&path, AccessMode::Write)?;
    zip.set_comment("short")?;
    zip.close()?;

    let after = fs::metadata(&path)?.len();
    let (eocd, offset) = ZipParser::new(fs::File::open(&path)?)?.find_eocd()?;
    assert!(after < before);
    assert_eq!(after, offset + 22 + eocd.comment_len as u64);
    assert_eq!(ZipArchive::open_file(&path, AccessMode::Read)?.comment(), "short");
    Ok(())
}

#[test]
fn precise_timestamps_survive() -> Result<()> {
    let times = EntryTimes {
        modified: Utc.with_ymd_and_hms(2023, 1, 2, 3, 4, 5).unwrap() + chrono::Duration::milliseconds(678),
        accessed: Utc.with_ymd_and_hms(2024, 6, 7, 8, 9, 10).unwrap(),
        created: Utc.with_ymd_and_hms(2001, 2, 3, 4, 5, 7).unwrap(),
    };
    let mut zip = ZipArchive::create(Cursor::new(Vec::new()), "");
    zip.add_stream(CompressionMethod::Stored, "t", &mut Cursor::new(b"t".to_vec()), times, "note")?;
    let bytes = zip.finish()?.into_inner();

    let mut zip = ZipArchive::open(Cursor::new(bytes), AccessMode::Read)?;
    let entry = &zip.read_central_dir()?[0];
    assert_eq!(entry.modified, times.modified);
    assert_eq!(entry.accessed, times.accessed);
    assert_eq!(entry.created, times.created);
    assert_eq!(entry.comment, "note");
    Ok(())
}

#[test]
fn far_future_timestamps_are_clamped() -> Result<()> {
    let mut zip = ZipArchive::create(Cursor::new(Vec::new()), "");
    let times = EntryTimes::uniform(chrono::DateTime::<Utc>::MAX_UTC);
    zip.add_stream(CompressionMethod::Stored, "x", &mut Cursor::new(b"x".to_vec()), times, "")?;
    let bytes = zip.finish()?.into_inner();

    let mut zip = ZipArchive::open(Cursor::new(bytes), AccessMode::Read)?;
    let entry = &zip.read_central_dir()?[0];
    assert!(entry.modified.year() >= 30000);
    assert_eq!(zip.extract_to_vec(entry)?, b"x");
    Ok(())
}

#[test]
fn bad_local_header_offset_fails_only_that_entry() -> Result<()> {
    let mut bytes = memory_archive(&[("good", b"intact"), ("bad", b"lost")])?;

    // Point the second directory record at an offset past the end of the file.
    let (eocd, _) = ZipParser::new(Cursor::new(&bytes))?.find_eocd()?;
    let first = eocd.cd_offset as usize;
    let lengths = |at: usize| u16::from_le_bytes([bytes[at], bytes[at + 1]]) as usize;
    let second = first + 46 + lengths(first + 28) + lengths(first + 30) + lengths(first + 32);
    bytes[second + 42..second + 46].copy_from_slice(&0x00FF_FF00u32.to_le_bytes());

    let mut zip = ZipArchive::open(Cursor::new(bytes), AccessMode::Read)?;
    let entries = zip.read_central_dir()?;
    assert_eq!(entries.len(), 2);
    assert_eq!(zip.extract_to_vec(&entries[0])?, b"intact");
    let err = zip.extract_to_vec(&entries[1]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::LocalHeaderMismatch);
    Ok(())
}

#[test]
fn remove_rebuilds_without_entry() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("prune.zip");
    file_archive(&path, &[("A", b"aaaa"), ("B", b"bbbb"), ("C", b"cccc")])?;

    let mut zip = ZipArchive::open_file(&path, AccessMode::Read)?;
    let entries = zip.read_central_dir()?;
    let original_c = entries[2].clone();
    let mut zip = zip.remove_entries(&entries[1..2])?;
    assert_eq!(zip.access(), AccessMode::Read);

    let remaining = zip.read_central_dir()?;
    let names: Vec<_> = remaining.iter().map(|e| e.file_name.as_str()).collect();
    assert_eq!(names, ["A", "C"]);
    assert_eq!(zip.extract_to_vec(&remaining[0])?, b"aaaa");
    assert_eq!(zip.extract_to_vec(&remaining[1])?, b"cccc");
    assert_eq!(remaining[1].modified, original_c.modified);
    assert_eq!(remaining[1].compression_method, original_c.compression_method);

    // No temporary files are left next to the archive.
    assert_eq!(fs::read_dir(dir.path())?.count(), 1);
    Ok(())
}

#[test]
fn failed_removal_leaves_file_unchanged() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("broken.zip");
    file_archive(&path, &[("A", b"aaaa"), ("B", b"bbbb"), ("C", b"cccc")])?;

    {
        let mut file = fs::OpenOptions::new().write(true).open(&path)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(b"XX")?;
    }
    let before = fs::read(&path)?;

    let mut zip = ZipArchive::open_file(&path, AccessMode::Read)?;
    let entries = zip.read_central_dir()?;
    let err = zip.remove_entries(&entries[1..2]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::LocalHeaderMismatch);

    assert_eq!(fs::read(&path)?, before);
    assert_eq!(fs::read_dir(dir.path())?.count(), 1);
    Ok(())
}

#[test]
fn removal_needs_a_named_file() -> Result<()> {
    let mut zip = ZipArchive::create(tempfile::tempfile()?, "");
    let entry = add_bytes(&mut zip, CompressionMethod::Stored, "a", b"a")?;
    let err = zip.remove_entries(&[entry]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RemovalNotSupported);
    Ok(())
}

#[test]
fn names_are_normalized() -> Result<()> {
    let mut zip = ZipArchive::create(Cursor::new(Vec::new()), "");
    let entry = add_bytes(&mut zip, CompressionMethod::Stored, "C:\\a\\\\b\\c.txt", b"c")?;
    assert_eq!(entry.file_name, "a/b/c.txt");
    Ok(())
}

#[test]
fn legacy_names_round_trip_through_cp437() -> Result<()> {
    let mut zip = ZipArchive::create(Cursor::new(Vec::new()), "");
    zip.set_options(ArchiveOptions::default().encode_utf8(false));
    add_bytes(&mut zip, CompressionMethod::Stored, "résumé.txt", b"cv")?;
    let bytes = zip.finish()?.into_inner();

    let mut zip = ZipArchive::open(Cursor::new(bytes), AccessMode::Read)?;
    let entry = &zip.read_central_dir()?[0];
    assert!(!entry.utf8);
    assert_eq!(entry.file_name, "résumé.txt");
    Ok(())
}

#[test]
fn read_mode_rejects_writes() -> Result<()> {
    let bytes = memory_archive(&[("a", b"a")])?;
    let mut zip = ZipArchive::open(Cursor::new(bytes), AccessMode::Read)?;

    let err = add_bytes(&mut zip, CompressionMethod::Stored, "b", b"b").unwrap_err();
    assert_eq!(err.downcast_ref::<zipstow::Error>().map(|e| e.kind()), Some(ErrorKind::WriteNotAllowed));
    assert_eq!(zip.set_comment("x").unwrap_err().kind(), ErrorKind::WriteNotAllowed);
    Ok(())
}

#[test]
fn unknown_method_is_rejected() {
    let mut zip = ZipArchive::create(Cursor::new(Vec::new()), "");
    let err = zip
        .begin_entry(CompressionMethod::Unknown(12), "x", "", fixed_time())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedMethod);
}

#[test]
fn garbage_is_not_an_archive() {
    let err = ZipArchive::open(Cursor::new(b"definitely not a zip".to_vec()), AccessMode::Read)
        .err()
        .map(|e| e.kind());
    assert_eq!(err, Some(ErrorKind::NotAnArchive));
}

#[test]
fn corrupted_payload_fails_checksum() -> Result<()> {
    let mut zip = ZipArchive::create(Cursor::new(Vec::new()), "");
    let entry = add_bytes(&mut zip, CompressionMethod::Stored, "s", b"sensitive")?;
    let mut bytes = zip.finish()?.into_inner();
    bytes[entry.data_offset as usize] ^= 0xFF;

    let mut zip = ZipArchive::open(Cursor::new(bytes), AccessMode::Read)?;
    let entries = zip.read_central_dir()?;
    let err = zip.extract_to_vec(&entries[0]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ChecksumMismatch);
    Ok(())
}

#[test]
fn abandoned_entry_is_left_out() -> Result<()> {
    let mut zip = ZipArchive::create(Cursor::new(Vec::new()), "");
    add_bytes(&mut zip, CompressionMethod::Stored, "kept", b"kept")?;
    let _abandoned = zip.begin_entry(CompressionMethod::Deflate, "abandoned", "", fixed_time())?;
    let bytes = zip.finish()?.into_inner();

    let mut zip = ZipArchive::open(Cursor::new(bytes), AccessMode::Read)?;
    let entries = zip.read_central_dir()?;
    assert_eq!(entries.len(), 1);
    assert_eq!(zip.extract_to_vec(&entries[0])?, b"kept");
    Ok(())
}

#[test]
fn extraction_mid_session_keeps_write_position() -> Result<()> {
    let mut zip = ZipArchive::create(Cursor::new(Vec::new()), "");
    let first = add_bytes(&mut zip, CompressionMethod::Deflate, "first", &b"1".repeat(500))?;
    assert_eq!(zip.extract_to_vec(&first)?, b"1".repeat(500));
    add_bytes(&mut zip, CompressionMethod::Deflate, "second", &b"2".repeat(500))?;
    let bytes = zip.finish()?.into_inner();

    let mut zip = ZipArchive::open(Cursor::new(bytes), AccessMode::Read)?;
    let entries = zip.read_central_dir()?;
    assert_eq!(zip.extract_to_vec(&entries[1])?, b"2".repeat(500));
    Ok(())
}

#[test]
fn directories_on_disk() -> Result<()> {
    let src = tempfile::tempdir()?;
    let root = src.path().join("project");
    fs::create_dir_all(root.join("src"))?;
    fs::write(root.join("README"), b"read me")?;
    fs::write(root.join("src/lib.rs"), b"pub fn answer() -> u32 { 42 }")?;

    let out = tempfile::tempdir()?;
    let archive = out.path().join("tree.zip");
    let mut zip = ZipArchive::create_file(&archive, "")?;
    let added = zip.add_directory(CompressionMethod::Deflate, &root, "", "tree")?;
    zip.close()?;

    let names: Vec<_> = added.iter().map(|e| e.file_name.as_str()).collect();
    assert_eq!(names, ["project/", "project/README", "project/src/", "project/src/lib.rs"]);
    assert!(added[0].is_directory());
    assert_eq!(added[0].comment, "tree");

    let mut zip = ZipArchive::open_file(&archive, AccessMode::Read)?;
    let dest = out.path().join("dest");
    for entry in zip.read_central_dir()? {
        let target = dest.join(entry.enclosed_name().unwrap());
        zip.extract_to_file(&entry, &target)?;
    }
    assert!(dest.join("project/src").is_dir());
    assert_eq!(fs::read(dest.join("project/src/lib.rs"))?, b"pub fn answer() -> u32 { 42 }");
    Ok(())
}

#[test]
fn extract_to_file_applies_modification_time() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut zip = ZipArchive::create(Cursor::new(Vec::new()), "");
    let entry = add_bytes(&mut zip, CompressionMethod::Stored, "dated.txt", b"dated")?;

    let target = dir.path().join("nested/dated.txt");
    zip.extract_to_file(&entry, &target)?;
    let modified: chrono::DateTime<Utc> = fs::metadata(&target)?.modified()?.into();
    assert_eq!(modified, fixed_time().modified);
    Ok(())
}

#[test]
fn unsafe_names_are_not_extracted() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut zip = ZipArchive::create(Cursor::new(Vec::new()), "");
    let entry = add_bytes(&mut zip, CompressionMethod::Stored, "../escape.txt", b"nope")?;

    let err = zip.extract_to_file(&entry, dir.path().join("escape.txt")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsafeEntryName);
    assert!(!dir.path().join("escape.txt").exists());
    Ok(())
}

#[tokio::test]
async fn async_source_and_sink() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let input = dir.path().join("input.txt");
    let text = b"async lines\n".repeat(1000);
    fs::write(&input, &text)?;

    let mut zip = ZipArchive::create(Cursor::new(Vec::new()), "");
    let mut source = tokio::fs::File::open(&input).await?;
    let entry = zip
        .add_stream_async(CompressionMethod::Deflate, "input.txt", &mut source, fixed_time(), "")
        .await?;
    assert_eq!(entry.crc32, crc32fast::hash(&text));

    let mut incompressible = Cursor::new(noise(4096));
    let noisy = zip
        .add_stream_async(CompressionMethod::Deflate, "noise", &mut incompressible, fixed_time(), "")
        .await?;
    assert_eq!(noisy.compression_method, CompressionMethod::Stored);
    let bytes = zip.finish()?.into_inner();

    let mut zip = ZipArchive::open(Cursor::new(bytes), AccessMode::Read)?;
    let entries = zip.read_central_dir()?;
    let mut sink: Vec<u8> = Vec::new();
    zip.extract_async(&entries[0], &mut sink).await?;
    assert_eq!(sink, text);
    Ok(())
}
