use assert_cmd::prelude::*; // Add methods on commands
use predicates::prelude::*; // Assertions on command output
use std::fs;
use std::path::{Path,PathBuf};
use std::process::Command; // Run programs
use tempfile;
use lzwar::archive::Header;
use lzwar::files::{file_mode,system_time_secs};
use lzwar::lzw;
type STDRESULT = Result<(),Box<dyn std::error::Error>>;

fn fixture(name: &str) -> PathBuf {
    Path::new("tests").join("files").join(name)
}

fn compress(archive: &Path,inputs: &[&Path]) -> STDRESULT {
    let mut cmd = Command::cargo_bin("lzwar")?;
    cmd.arg("compress").arg(archive);
    for input in inputs {
        cmd.arg(input);
    }
    cmd.assert().success();
    Ok(())
}

/// flip one byte near the end of the archive, inside the last payload
fn corrupt_tail(archive: &Path) -> STDRESULT {
    let mut raw = fs::read(archive)?;
    let at = raw.len() - 10;
    raw[at] ^= 0xff;
    fs::write(archive,&raw)?;
    Ok(())
}

#[test]
fn round_trip_single_file() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let archive = temp_dir.path().join("arch.lzw");
    compress(&archive,&[&fixture("0.txt")])?;
    let out = temp_dir.path().join("out");
    let mut cmd = Command::cargo_bin("lzwar")?;
    cmd.arg("decompress").arg(&archive)
        .arg("-d").arg(&out)
        .assert()
        .success();
    assert_eq!(fs::read(out.join("0.txt"))?,fs::read(fixture("0.txt"))?);
    Ok(())
}

#[test]
fn round_trip_directory() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let data = temp_dir.path().join("data");
    fs::create_dir_all(data.join("sub"))?;
    fs::copy(fixture("0.txt"),data.join("a.txt"))?;
    fs::copy(fixture("1.txt"),data.join("sub").join("b.txt"))?;
    let archive = temp_dir.path().join("arch.lzw");
    compress(&archive,&[&data])?;
    let out = temp_dir.path().join("out");
    let mut cmd = Command::cargo_bin("lzwar")?;
    cmd.arg("decompress").arg(&archive)
        .arg("-d").arg(&out)
        .assert()
        .success();
    assert_eq!(fs::read(out.join("data").join("a.txt"))?,fs::read(fixture("0.txt"))?);
    assert_eq!(fs::read(out.join("data").join("sub").join("b.txt"))?,fs::read(fixture("1.txt"))?);
    Ok(())
}

#[test]
fn header_records_what_was_written() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let archive = temp_dir.path().join("arch.lzw");
    compress(&archive,&[&fixture("0.txt")])?;
    let meta = fs::metadata(fixture("0.txt"))?;
    let raw = fs::read(&archive)?;
    assert_eq!(raw[0],1);
    let header = Header::parse(&mut &raw[1..])?;
    // a second, independent encoder must agree with the recorded payload
    let compressed = lzw::compress_slice(&fs::read(fixture("0.txt"))?)?;
    assert_eq!(header.c_size,compressed.len() as u64);
    assert_eq!(header.hash,md5::compute(&compressed).0);
    assert_eq!(header.mode,file_mode(&meta));
    assert!((header.atime - system_time_secs(meta.accessed()?)).abs() < 1e-5);
    assert!((header.mtime - system_time_secs(meta.modified()?)).abs() < 1e-5);
    assert_eq!(header.size,meta.len());
    assert_eq!(header.path,"./");
    assert_eq!(header.name,"0.txt");
    // the record framing accounts for every byte of the archive
    assert_eq!(raw.len() as u64,1 + header.len() + header.c_size);
    Ok(())
}

#[test]
fn damaged_file_kept_with_i() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let archive = temp_dir.path().join("arch.lzw");
    compress(&archive,&[&fixture("0.txt")])?;
    corrupt_tail(&archive)?;
    let out = temp_dir.path().join("out");
    let mut cmd = Command::cargo_bin("lzwar")?;
    cmd.arg("decompress").arg(&archive)
        .arg("-d").arg(&out)
        .arg("-i")
        .assert()
        .success()
        .stderr(predicate::str::contains("damaged!").count(1));
    assert!(out.join("0.txt").exists());
    Ok(())
}

#[test]
fn damaged_archive_dropped_with_a() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let archive = temp_dir.path().join("arch.lzw");
    compress(&archive,&[&fixture("0.txt")])?;
    corrupt_tail(&archive)?;
    let out = temp_dir.path().join("out");
    let mut cmd = Command::cargo_bin("lzwar")?;
    cmd.arg("decompress").arg(&archive)
        .arg("-d").arg(&out)
        .arg("-a")
        .assert()
        .success()
        .stderr(predicate::str::contains("Archive not unpacked").count(1));
    assert!(!out.join("0.txt").exists());
    Ok(())
}

#[test]
fn damaged_entry_dropped_with_f() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let archive = temp_dir.path().join("arch.lzw");
    compress(&archive,&[&fixture("0.txt"),&fixture("1.txt")])?;
    corrupt_tail(&archive)?;
    let out = temp_dir.path().join("out");
    let mut cmd = Command::cargo_bin("lzwar")?;
    cmd.arg("decompress").arg(&archive)
        .arg("-d").arg(&out)
        .arg("-f")
        .assert()
        .success()
        .stderr(predicate::str::contains("1.txt not unpacked").count(1));
    assert!(out.join("0.txt").exists());
    assert!(!out.join("1.txt").exists());
    Ok(())
}

#[test]
fn metadata_restored_with_r() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let source = temp_dir.path().join("0.txt");
    fs::copy(fixture("0.txt"),&source)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&source,fs::Permissions::from_mode(0o600))?;
    }
    filetime::set_file_times(&source,
        filetime::FileTime::from_unix_time(1_600_000_000,250_000_000),
        filetime::FileTime::from_unix_time(1_600_000_001,500_000_000))?;
    let archive = temp_dir.path().join("arch.lzw");
    compress(&archive,&[&source])?;
    let captured = fs::metadata(&source)?;
    let out = temp_dir.path().join("out");
    let mut cmd = Command::cargo_bin("lzwar")?;
    cmd.arg("decompress").arg(&archive)
        .arg("-d").arg(&out)
        .arg("-r")
        .assert()
        .success();
    let restored = fs::metadata(out.join("0.txt"))?;
    assert_eq!(file_mode(&restored),file_mode(&captured));
    assert!((system_time_secs(restored.modified()?) - system_time_secs(captured.modified()?)).abs() < 1e-5);
    assert!((system_time_secs(restored.accessed()?) - system_time_secs(captured.accessed()?)).abs() < 1e-5);
    Ok(())
}

#[test]
fn listing_shows_stored_paths() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let archive = temp_dir.path().join("arch.lzw");
    compress(&archive,&[&fixture("0.txt"),&fixture("1.txt")])?;
    let mut cmd = Command::cargo_bin("lzwar")?;
    cmd.arg("listing").arg(&archive)
        .assert()
        .success()
        .stdout(predicate::str::contains("0.txt").and(predicate::str::contains("1.txt")));
    Ok(())
}

#[test]
fn verbose_listing_shows_rates() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let archive = temp_dir.path().join("arch.lzw");
    compress(&archive,&[&fixture("0.txt")])?;
    let mut cmd = Command::cargo_bin("lzwar")?;
    cmd.arg("listing").arg(&archive)
        .arg("-v")
        .assert()
        .success()
        .stdout(predicate::str::contains("RATE (%)").and(predicate::str::contains("0.txt")));
    Ok(())
}

#[test]
fn conflicting_policies_rejected() -> STDRESULT {
    let mut cmd = Command::cargo_bin("lzwar")?;
    cmd.arg("decompress").arg("arch.lzw")
        .arg("-i").arg("-a")
        .assert()
        .failure();
    Ok(())
}
