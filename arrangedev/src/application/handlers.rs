use std::fs;
use std::path::{Path, PathBuf};

use arrange_core::error::Result;
use arrange_core::util::{directory_size, format_size};
use arrange_core::{
    BatchEvent, BatchRequest, BatchSummary, DateBasis, Dispatcher, EngineConfig, OrganizeBy,
    OrganizeParams, Password, TaskOutcome,
};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::presentation::cli::RunArgs;

/// Folder arguments become their immediate children, in name order.
pub fn expand_dirs(entries: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut out = Vec::with_capacity(entries.len());
    for e in entries {
        if !e.is_dir() {
            out.push(e);
            continue;
        }
        for child in WalkDir::new(&e).min_depth(1).max_depth(1).sort_by_file_name() {
            match child {
                Ok(c) => out.push(c.into_path()),
                Err(err) => warn!("skipping unreadable entry under {}: {}", e.display(), err),
            }
        }
    }
    out
}

fn entry_size(path: &Path) -> u64 {
    match fs::metadata(path) {
        Ok(m) if m.is_dir() => directory_size(path),
        Ok(m) => m.len(),
        Err(_) => 0,
    }
}

fn report_workload(entries: &[PathBuf]) {
    let total: u64 = entries.iter().map(|e| entry_size(e)).sum();
    info!("{} entries, {} total", entries.len(), format_size(total));
}

fn prepare_entries(args: &RunArgs, entries: Vec<PathBuf>) -> Vec<PathBuf> {
    if args.expand_dirs {
        expand_dirs(entries)
    } else {
        entries
    }
}

fn dispatcher(args: &RunArgs, date_basis: DateBasis) -> Dispatcher {
    Dispatcher::new(EngineConfig {
        max_workers: args.workers,
        date_basis,
    })
}

/// Run in the background and render events until the batch completes.
fn drive(args: &RunArgs, d: Dispatcher, request: BatchRequest) -> Result<BatchSummary> {
    let handle = d.spawn(request)?;
    let mut outcomes = 0usize;

    for event in handle.events().iter() {
        match event {
            BatchEvent::Status { text } => info!("{text}"),
            BatchEvent::Progress { completed, total } => debug!("progress {completed}/{total}"),
            BatchEvent::Outcome(outcome) => {
                match &outcome {
                    TaskOutcome::Done {
                        source,
                        destination,
                    } => println!(
                        "{} -> {} ({})",
                        source.display(),
                        destination.display(),
                        format_size(entry_size(destination))
                    ),
                    TaskOutcome::Skipped { source } => println!("{} skipped", source.display()),
                    TaskOutcome::Failed { source, error, .. } => {
                        println!("{} failed: {}", source.display(), error)
                    }
                }
                outcomes += 1;
                if args.cancel_after == Some(outcomes) {
                    info!("requesting cancellation after {outcomes} outcomes");
                    handle.cancel();
                }
            }
            BatchEvent::Completed(summary) => println!("{}", summary.message()),
        }
    }
    handle.wait()
}

pub fn handle_organize(
    args: &RunArgs,
    entries: Vec<PathBuf>,
    by: OrganizeBy,
    dest: Option<PathBuf>,
    created: bool,
) -> Result<BatchSummary> {
    let entries = prepare_entries(args, entries);
    report_workload(&entries);
    let basis = if created {
        DateBasis::Created
    } else {
        DateBasis::Modified
    };
    let request = BatchRequest::organize(
        entries,
        OrganizeParams {
            organize_by: by,
            destination_root: dest,
        },
    )
    .remove_originals(args.remove_originals);
    drive(args, dispatcher(args, basis), request)
}

pub fn handle_encrypt(args: &RunArgs, entries: Vec<PathBuf>, password: String) -> Result<BatchSummary> {
    let entries = prepare_entries(args, entries);
    report_workload(&entries);
    let request = BatchRequest::encrypt(entries, Password::new(password))
        .remove_originals(args.remove_originals);
    drive(args, dispatcher(args, DateBasis::default()), request)
}

pub fn handle_decrypt(args: &RunArgs, entries: Vec<PathBuf>, password: String) -> Result<BatchSummary> {
    let entries = prepare_entries(args, entries);
    report_workload(&entries);
    let request = BatchRequest::decrypt(entries, Password::new(password))
        .remove_originals(args.remove_originals);
    drive(args, dispatcher(args, DateBasis::default()), request)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_dirs_lists_direct_children_only() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("f");
        fs::create_dir_all(folder.join("deep")).unwrap();
        fs::write(folder.join("b.txt"), b"b").unwrap();
        fs::write(folder.join("a.txt"), b"a").unwrap();
        fs::write(folder.join("deep").join("c.txt"), b"c").unwrap();
        let loose = dir.path().join("loose.txt");
        fs::write(&loose, b"l").unwrap();

        let got = expand_dirs(vec![folder.clone(), loose.clone()]);
        assert_eq!(
            got,
            vec![
                folder.join("a.txt"),
                folder.join("b.txt"),
                folder.join("deep"),
                loose
            ]
        );
    }

    #[test]
    fn entry_size_covers_files_and_folders() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("x"), vec![0u8; 5]).unwrap();
        assert_eq!(entry_size(&dir.path().join("x")), 5);
        assert_eq!(entry_size(dir.path()), 5);
        assert_eq!(entry_size(&dir.path().join("missing")), 0);
    }
}
