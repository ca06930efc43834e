use std::{
    fmt,
    fs::{self, File},
    io,
    path::Path,
};

use anyhow::{Context as _, Result, bail};
use clap::ValueEnum;

use crate::models::OrganizeStats;
use crate::utils::file::{ChannelFolder, unique_path};

use super::categorize::{Categories, Categorized};

const PROGRESS_EVERY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Mode {
    /// Keep the originals in place
    #[default]
    Copy,
    /// Remove the originals
    Move,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mode::Copy => "copy",
            Mode::Move => "move",
        })
    }
}

fn transfer(src: &Path, dst: &Path, mode: Mode) -> io::Result<()> {
    match mode {
        Mode::Copy => copy_with_mtime(src, dst),
        Mode::Move => match fs::rename(src, dst) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
                copy_with_mtime(src, dst)?;
                fs::remove_file(src)
            }
            Err(e) => Err(e),
        },
    }
}

/// Copies contents and permissions, then carries over the modification time.
fn copy_with_mtime(src: &Path, dst: &Path) -> io::Result<()> {
    fs::copy(src, dst)?;
    let modified = fs::metadata(src)?.modified()?;
    File::options().write(true).open(dst)?.set_modified(modified)
}

/// Places each categorized download under `categorized/<category>/`,
/// replacing earlier copies. Returns how many files were placed.
pub fn organize_categorized(folder: &ChannelFolder, categorized: &Categorized, mode: Mode) -> Result<usize> {
    let downloads = folder.downloads();
    let mut placed = 0;

    for (category, files) in categorized {
        if files.is_empty() {
            continue;
        }

        let category_dir = folder.categorized().join(category);
        fs::create_dir_all(&category_dir)
            .with_context(|| format!("failed to create {}", category_dir.display()))?;

        for filename in files {
            let src = downloads.join(filename);
            if !src.is_file() {
                log::debug!("{} is no longer in downloads, skipping", filename);
                continue;
            }
            transfer(&src, &category_dir.join(filename), mode)
                .with_context(|| format!("failed to {mode} {filename}"))?;
            match mode {
                Mode::Copy => println!("Copied: {filename} -> {category}/"),
                Mode::Move => println!("Moved: {filename} -> {category}/"),
            }
            placed += 1;
        }
    }
    Ok(placed)
}

/// Sorts every regular file in `source` into `target/<category>/`. Name
/// clashes get a `_N` suffix; a file that fails is reported and skipped.
pub fn organize_directory(source: &Path, target: &Path, categories: &Categories, mode: Mode) -> Result<OrganizeStats> {
    if !source.is_dir() {
        bail!("source directory '{}' not found", source.display());
    }
    fs::create_dir_all(target).with_context(|| format!("failed to create {}", target.display()))?;

    let mut files = Vec::new();
    for entry in fs::read_dir(source)? {
        let path = entry?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();

    let mut stats = OrganizeStats { found: files.len(), ..OrganizeStats::default() };
    println!("Found {} files to organize...", stats.found);
    println!("Mode: {}", mode.to_string().to_uppercase());
    println!("{}", "-".repeat(60));

    for path in files {
        let filename = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        let category = categories.classify_filename(&filename);
        let category_dir = target.join(category);

        let result = fs::create_dir_all(&category_dir).and_then(|()| {
            let dst = unique_path(&category_dir, &filename, |stem, n| format!("{stem}_{n}"));
            transfer(&path, &dst, mode)
        });

        match result {
            Ok(()) => {
                stats.add(category);
                if stats.processed % PROGRESS_EVERY == 0 {
                    println!("Processed {}/{} files...", stats.processed, stats.found);
                }
            }
            Err(e) => {
                log::warn!("failed to {mode} {}: {e}", path.display());
                println!("Error processing {filename}: {e}");
                stats.errors += 1;
            }
        }
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CategoryConfig;

    fn categories() -> Categories {
        Categories::new(&[CategoryConfig { name: "Labs".into(), keywords: vec!["lab".into()] }])
    }

    #[test]
    fn directory_copy_keeps_originals_and_numbers_clashes() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("in");
        let target = dir.path().join("out");
        fs::create_dir_all(&source).unwrap();
        fs::create_dir_all(target.join("Labs")).unwrap();
        fs::write(source.join("Lab 1.pdf"), b"new").unwrap();
        fs::write(source.join("photo.png"), b"img").unwrap();
        fs::write(target.join("Labs").join("Lab 1.pdf"), b"old").unwrap();

        let stats = organize_directory(&source, &target, &categories(), Mode::Copy).unwrap();

        assert_eq!((stats.found, stats.processed, stats.errors), (2, 2, 0));
        assert_eq!(stats.per_category.get("Labs"), Some(&1));
        assert_eq!(stats.per_category.get("19_Images_Photos"), Some(&1));
        assert_eq!(fs::read(target.join("Labs").join("Lab 1.pdf")).unwrap(), b"old");
        assert_eq!(fs::read(target.join("Labs").join("Lab 1_1.pdf")).unwrap(), b"new");
        assert!(source.join("Lab 1.pdf").exists());
    }

    #[test]
    fn directory_move_empties_the_source() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("in");
        let target = dir.path().join("out");
        fs::create_dir_all(source.join("subdir")).unwrap();
        fs::write(source.join("notes.txt"), b"x").unwrap();

        let stats = organize_directory(&source, &target, &categories(), Mode::Move).unwrap();

        assert_eq!(stats.processed, 1);
        assert!(!source.join("notes.txt").exists());
        assert!(source.join("subdir").is_dir());
        assert!(target.join("99_Uncategorized").join("notes.txt").exists());
    }

    #[test]
    fn copies_keep_the_modification_time() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.pdf");
        let dst = dir.path().join("b.pdf");
        fs::write(&src, b"x").unwrap();
        let past = std::time::SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_600_000_000);
        File::options().write(true).open(&src).unwrap().set_modified(past).unwrap();

        transfer(&src, &dst, Mode::Copy).unwrap();
        assert_eq!(fs::metadata(&dst).unwrap().modified().unwrap(), past);
        assert!(src.exists());
    }

    #[test]
    fn failed_move_leaves_the_source_alone() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.pdf");
        fs::write(&src, b"x").unwrap();

        assert!(transfer(&src, &dir.path().join("missing").join("a.pdf"), Mode::Move).is_err());
        assert!(src.exists());
    }

    #[test]
    fn missing_source_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(organize_directory(&dir.path().join("nope"), dir.path(), &categories(), Mode::Copy).is_err());
    }

    #[test]
    fn categorized_overwrites_and_skips_missing_sources() {
        let dir = tempfile::tempdir().unwrap();
        let folder = ChannelFolder::new(dir.path().join("chan"));
        fs::create_dir_all(folder.downloads()).unwrap();
        fs::write(folder.downloads().join("a.pdf"), b"fresh").unwrap();
        fs::create_dir_all(folder.categorized().join("Labs")).unwrap();
        fs::write(folder.categorized().join("Labs").join("a.pdf"), b"stale").unwrap();

        let categorized: Categorized = vec![
            ("Labs".into(), vec!["a.pdf".into(), "gone.pdf".into()]),
            ("Empty".into(), vec![]),
        ];
        let placed = organize_categorized(&folder, &categorized, Mode::Move).unwrap();

        assert_eq!(placed, 1);
        assert_eq!(fs::read(folder.categorized().join("Labs").join("a.pdf")).unwrap(), b"fresh");
        assert!(!folder.downloads().join("a.pdf").exists());
        assert!(!folder.categorized().join("Empty").exists());
    }
}
