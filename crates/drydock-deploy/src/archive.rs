//! Archive handling: server packages, runtime bundles, jar containers.
//!
//! Zip (and jar-as-zip) plus tar+gzip, the only container formats the
//! pipeline touches. Extraction is wholesale; the uploader is the trust
//! boundary. The single-root hoist normalizes "zip of a folder" packages
//! so content lands directly in the instance directory.

use std::fs::File;
use std::io;
use std::path::Path;

use flate2::read::GzDecoder;
use tracing::debug;
use walkdir::WalkDir;
use zip::ZipArchive;
use zip::write::{SimpleFileOptions, ZipWriter};

use crate::error::{DeployError, DeployResult};

fn arch_err(e: impl std::fmt::Display) -> DeployError {
    DeployError::Archive(e.to_string())
}

/// Extract an archive into `dest`, dispatching on the file extension.
pub fn unpack(archive: &Path, dest: &Path) -> DeployResult<()> {
    let name = archive
        .file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    std::fs::create_dir_all(dest)?;
    if name.ends_with(".zip") || name.ends_with(".jar") {
        let mut zip = ZipArchive::new(File::open(archive)?).map_err(arch_err)?;
        zip.extract(dest).map_err(arch_err)?;
        Ok(())
    } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        let tar = GzDecoder::new(File::open(archive)?);
        tar::Archive::new(tar).unpack(dest)?;
        Ok(())
    } else {
        Err(DeployError::Archive(format!(
            "unsupported archive format: {name}"
        )))
    }
}

/// If `dir` contains exactly one directory and no loose files, move that
/// directory's contents up one level. Returns whether a hoist happened.
pub fn hoist_single_root(dir: &Path) -> DeployResult<bool> {
    let entries: Vec<_> = std::fs::read_dir(dir)?.collect::<Result<_, _>>()?;
    if entries.len() != 1 || !entries[0].file_type()?.is_dir() {
        return Ok(false);
    }
    let root = entries[0].path();
    for child in std::fs::read_dir(&root)? {
        let child = child?;
        std::fs::rename(child.path(), dir.join(child.file_name()))?;
    }
    std::fs::remove_dir(&root)?;
    debug!(dir = %dir.display(), "hoisted single-root package directory");
    Ok(true)
}

/// Extract and normalize a content package into the instance directory.
pub fn unpack_and_hoist(archive: &Path, dest: &Path) -> DeployResult<bool> {
    unpack(archive, dest)?;
    hoist_single_root(dest)
}

/// Names of every entry in a zip archive, in archive order.
pub fn list_entries(archive: &Path) -> DeployResult<Vec<String>> {
    let mut zip = ZipArchive::new(File::open(archive)?).map_err(arch_err)?;
    let mut names = Vec::with_capacity(zip.len());
    for i in 0..zip.len() {
        names.push(zip.by_index(i).map_err(arch_err)?.name().to_string());
    }
    Ok(names)
}

/// Read one named entry of a zip archive into memory.
pub fn read_entry(archive: &Path, entry: &str) -> DeployResult<Vec<u8>> {
    let mut zip = ZipArchive::new(File::open(archive)?).map_err(arch_err)?;
    let mut file = zip.by_name(entry).map_err(arch_err)?;
    let mut buf = Vec::with_capacity(file.size() as usize);
    io::copy(&mut file, &mut buf)?;
    Ok(buf)
}

/// Extract one named entry of a zip archive to an exact file path.
pub fn extract_entry(archive: &Path, entry: &str, dest: &Path) -> DeployResult<()> {
    let mut zip = ZipArchive::new(File::open(archive)?).map_err(arch_err)?;
    let mut file = zip.by_name(entry).map_err(arch_err)?;
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut out = File::create(dest)?;
    io::copy(&mut file, &mut out)?;
    Ok(())
}

/// Extract every entry under `prefix` into `dest`, preserving the layout
/// below the prefix. Returns how many files landed.
pub fn extract_entries_under(archive: &Path, prefix: &str, dest: &Path) -> DeployResult<usize> {
    let mut zip = ZipArchive::new(File::open(archive)?).map_err(arch_err)?;
    let mut extracted = 0;
    for i in 0..zip.len() {
        let mut file = zip.by_index(i).map_err(arch_err)?;
        let name = file.name().to_string();
        let Some(rest) = name.strip_prefix(prefix) else {
            continue;
        };
        if rest.is_empty() || rest.split('/').any(|c| c == "..") {
            continue;
        }
        let target = dest.join(rest);
        if name.ends_with('/') {
            std::fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)?;
        io::copy(&mut file, &mut out)?;
        extracted += 1;
    }
    Ok(extracted)
}

/// Zip a directory tree into `dest_zip` (used by scheduled backups).
/// Symlinks are skipped; entry names are relative to `src`.
pub fn zip_dir(src: &Path, dest_zip: &Path) -> DeployResult<()> {
    if let Some(parent) = dest_zip.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut zip = ZipWriter::new(File::create(dest_zip)?);
    let options = SimpleFileOptions::default();
    for entry in WalkDir::new(src).min_depth(1) {
        let entry = entry.map_err(arch_err)?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(arch_err)?
            .to_string_lossy()
            .replace('\\', "/");
        if entry.file_type().is_dir() {
            zip.add_directory(format!("{rel}/"), options).map_err(arch_err)?;
        } else if entry.file_type().is_file() {
            zip.start_file(rel, options).map_err(arch_err)?;
            let mut f = File::open(entry.path())?;
            io::copy(&mut f, &mut zip)?;
        }
    }
    zip.finish().map_err(arch_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn build_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let mut zip = ZipWriter::new(File::create(path).unwrap());
        let options = SimpleFileOptions::default();
        for (name, content) in entries {
            if name.ends_with('/') {
                zip.add_directory(name.to_string(), options).unwrap();
            } else {
                zip.start_file(name.to_string(), options).unwrap();
                zip.write_all(content).unwrap();
            }
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_unpack_zip_and_hoist_single_root() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("pack.zip");
        build_zip(
            &zip_path,
            &[
                ("pack/", b""),
                ("pack/server.properties", b"motd=hi"),
                ("pack/mods/", b""),
                ("pack/mods/a.jar", b"jar"),
            ],
        );
        let dest = dir.path().join("out");
        let hoisted = unpack_and_hoist(&zip_path, &dest).unwrap();
        assert!(hoisted);
        assert!(dest.join("server.properties").exists());
        assert!(dest.join("mods/a.jar").exists());
        assert!(!dest.join("pack").exists());
    }

    #[test]
    fn test_no_hoist_with_loose_files() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("pack.zip");
        build_zip(
            &zip_path,
            &[("config/", b""), ("config/x.toml", b"x"), ("eula.txt", b"true")],
        );
        let dest = dir.path().join("out");
        let hoisted = unpack_and_hoist(&zip_path, &dest).unwrap();
        assert!(!hoisted);
        assert!(dest.join("eula.txt").exists());
        assert!(dest.join("config/x.toml").exists());
    }

    #[test]
    fn test_unpack_tar_gz() {
        let dir = tempfile::tempdir().unwrap();
        let tgz = dir.path().join("runtime.tar.gz");
        {
            let gz = flate2::write::GzEncoder::new(
                File::create(&tgz).unwrap(),
                flate2::Compression::default(),
            );
            let mut tar = tar::Builder::new(gz);
            let payload = b"#!/bin/sh\n";
            let mut header = tar::Header::new_gnu();
            header.set_size(payload.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            tar.append_data(&mut header, "jdk/bin/java", &payload[..])
                .unwrap();
            tar.into_inner().unwrap().finish().unwrap();
        }
        let dest = dir.path().join("out");
        unpack(&tgz, &dest).unwrap();
        assert!(dest.join("jdk/bin/java").exists());
    }

    #[test]
    fn test_unsupported_format() {
        let dir = tempfile::tempdir().unwrap();
        let rar = dir.path().join("pack.rar");
        std::fs::write(&rar, b"nope").unwrap();
        let err = unpack(&rar, &dir.path().join("out")).unwrap_err();
        assert!(err.to_string().contains("unsupported archive format"));
    }

    #[test]
    fn test_entry_listing_and_single_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("installer.jar");
        build_zip(
            &jar,
            &[
                ("install_profile.json", b"{}"),
                ("maven/", b""),
                ("maven/com/example/lib.jar", b"lib"),
            ],
        );
        let names = list_entries(&jar).unwrap();
        assert!(names.contains(&"install_profile.json".to_string()));

        let out = dir.path().join("profile.json");
        extract_entry(&jar, "install_profile.json", &out).unwrap();
        assert_eq!(std::fs::read(&out).unwrap(), b"{}");

        let libs = dir.path().join("libraries");
        let count = extract_entries_under(&jar, "maven/", &libs).unwrap();
        assert_eq!(count, 1);
        assert!(libs.join("com/example/lib.jar").exists());
    }

    #[test]
    fn test_zip_dir_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let world = dir.path().join("world");
        std::fs::create_dir_all(world.join("region")).unwrap();
        std::fs::write(world.join("level.dat"), b"data").unwrap();
        std::fs::write(world.join("region/r.0.0.mca"), b"chunk").unwrap();

        let backup = dir.path().join("backup.zip");
        zip_dir(&world, &backup).unwrap();

        let restored = dir.path().join("restored");
        unpack(&backup, &restored).unwrap();
        assert_eq!(std::fs::read(restored.join("level.dat")).unwrap(), b"data");
        assert_eq!(
            std::fs::read(restored.join("region/r.0.0.mca")).unwrap(),
            b"chunk"
        );
    }
}
