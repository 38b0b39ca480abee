//! Input and output staging pipelines
//!
//! These functions do blocking file I/O; the orchestrator runs them on the
//! blocking thread pool. Input staging checks its cancellation token between
//! files and between archive entries, and only ever creates directories
//! strictly below the working directory, so a cancelled batch cannot bring
//! back a working directory that was already released.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use zip::ZipArchive;

use computation_core::{
    ComputationError, ComputationResult, FilePostProcessor, FilePreProcessor, InputFile, OutputFile,
};

/// Suffix appended by gzip postprocessing
pub const GZIP_SUFFIX: &str = ".gz";

/// Name of the decompressed file: the source name minus its last three characters
pub fn gunzipped_name(name: &str) -> Option<&str> {
    let cut = name.char_indices().rev().nth(2).map(|(i, _)| i)?;
    (cut > 0).then(|| &name[..cut])
}

/// Bring every input of `index` into `working_dir`.
///
/// An input is looked up in the working directory first, then in the common
/// directory. Common inputs without a preprocessor are copied; with a
/// preprocessor, its output is written to the working directory instead.
pub fn stage_inputs(
    working_dir: &Path,
    common_dir: &Path,
    inputs: &[InputFile],
    index: usize,
    token: &CancellationToken,
) -> ComputationResult<()> {
    for file in inputs {
        if token.is_cancelled() {
            return Err(ComputationError::Cancelled);
        }
        let name = file.name(index);

        let mut source = working_dir.join(&name);
        if !source.exists() {
            source = common_dir.join(&name);
            if !source.exists() {
                return Err(ComputationError::MissingInputFile(name));
            }
            if file.pre_processor.is_none() {
                copy_file(&source, working_dir, &working_dir.join(&name))
                    .map_err(|e| ComputationError::staging(&name, e))?;
                debug!("Copied common input {} into {}", name, working_dir.display());
            }
        }

        match file.pre_processor {
            None => {}
            Some(FilePreProcessor::FileGunzip) => {
                let target = gunzipped_name(&name).ok_or_else(|| {
                    ComputationError::staging(
                        &name,
                        io::Error::new(io::ErrorKind::InvalidInput, "name too short to strip a .gz suffix"),
                    )
                })?;
                gunzip_file(&source, &working_dir.join(target))
                    .map_err(|e| ComputationError::staging(&name, e))?;
                debug!("Decompressed {} into {}", name, target);
            }
            Some(FilePreProcessor::ArchiveUnzip) => {
                let count = unzip_archive(&source, working_dir, &name, token)?;
                debug!("Extracted {} entries from {}", count, name);
            }
        }
    }
    Ok(())
}

/// Apply postprocessors to the outputs of `index` that exist as regular files
pub fn stage_outputs(working_dir: &Path, outputs: &[OutputFile], index: usize) -> ComputationResult<()> {
    for file in outputs {
        let Some(post_processor) = file.post_processor else {
            continue;
        };
        let name = file.name(index);
        let path = working_dir.join(&name);
        if !path.is_file() {
            continue;
        }

        match post_processor {
            FilePostProcessor::FileGzip => {
                let target = working_dir.join(format!("{}{}", name, GZIP_SUFFIX));
                gzip_file(&path, &target).map_err(|e| ComputationError::staging(&name, e))?;
                debug!("Compressed {} into {}", name, target.display());
            }
        }
    }
    Ok(())
}

/// Create `dir` and its missing ancestors up to, but excluding, `working_dir`.
///
/// Fails with `NotFound` when `working_dir` itself is gone.
fn create_dirs_below(working_dir: &Path, dir: &Path) -> io::Result<()> {
    let relative = dir.strip_prefix(working_dir).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} is outside {}", dir.display(), working_dir.display()),
        )
    })?;

    let mut current = working_dir.to_path_buf();
    for component in relative.components() {
        current.push(component);
        match fs::create_dir(&current) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists && current.is_dir() => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

fn copy_file(source: &Path, working_dir: &Path, target: &Path) -> io::Result<()> {
    if let Some(parent) = target.parent() {
        create_dirs_below(working_dir, parent)?;
    }
    fs::copy(source, target)?;
    Ok(())
}

fn gunzip_file(source: &Path, target: &Path) -> io::Result<()> {
    let mut decoder = GzDecoder::new(BufReader::new(File::open(source)?));
    let mut output = BufWriter::new(File::create(target)?);
    io::copy(&mut decoder, &mut output)?;
    output.flush()
}

fn gzip_file(source: &Path, target: &Path) -> io::Result<()> {
    let mut input = BufReader::new(File::open(source)?);
    let mut encoder = GzEncoder::new(BufWriter::new(File::create(target)?), Compression::default());
    io::copy(&mut input, &mut encoder)?;
    encoder.finish()?.flush()
}

fn unzip_archive(
    source: &Path,
    working_dir: &Path,
    name: &str,
    token: &CancellationToken,
) -> ComputationResult<usize> {
    let archive_error = |e: zip::result::ZipError| ComputationError::Archive {
        file: name.to_string(),
        message: e.to_string(),
    };

    let file = File::open(source).map_err(|e| ComputationError::staging(name, e))?;
    let mut archive = ZipArchive::new(BufReader::new(file)).map_err(archive_error)?;

    let mut extracted = 0;
    for i in 0..archive.len() {
        if token.is_cancelled() {
            debug!("Unzip of {} cancelled after {} entries", name, extracted);
            return Err(ComputationError::Cancelled);
        }
        let mut entry = archive.by_index(i).map_err(archive_error)?;
        let relative = match entry.enclosed_name() {
            Some(path) => path.to_path_buf(),
            None => {
                warn!("Skipping archive entry with unsafe name at index {} in {}", i, name);
                continue;
            }
        };
        let target = working_dir.join(&relative);

        let result = if entry.is_dir() {
            create_dirs_below(working_dir, &target)
        } else {
            // File::create truncates, overwriting files of the same name
            target
                .parent()
                .map_or(Ok(()), |parent| create_dirs_below(working_dir, parent))
                .and_then(|_| File::create(&target))
                .and_then(|mut output| io::copy(&mut entry, &mut output).map(|_| ()))
        };
        result.map_err(|e| ComputationError::staging(relative.to_string_lossy(), e))?;
        extracted += 1;
    }
    Ok(extracted)
}
