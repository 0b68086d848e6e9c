// == Std
use std::path::{Path, PathBuf};

// == Internal crates
use tree_collector::{common::RemotePath, v1::mock_client::MockRecord};

// == External crates
use argh::FromArgs;
use walkdir::WalkDir;

#[derive(FromArgs)]
/// Serializes a local directory into mock namespace records
struct Args {
    /// output compact JSON instead of pretty-printed
    #[argh(switch, short = 'c')]
    compact: bool,
    /// remote path the target directory is mapped to, defaults to the namespace root
    #[argh(option, short = 'p', default = "String::new()")]
    prefix: String,
    /// the target directory to serialize
    #[argh(positional)]
    target_dir: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Args = argh::from_env();

    let target_path = PathBuf::from(&args.target_dir);

    if !target_path.is_dir() {
        eprintln!("Error: target path '{}' is not a directory", args.target_dir);
        std::process::exit(1);
    }

    let prefix = RemotePath::new(&args.prefix)?;
    let records = generate_records_from_path(&target_path, &prefix)?;
    if args.compact {
        serde_json::to_writer(std::io::stdout(), &records)?;
    } else {
        serde_json::to_writer_pretty(std::io::stdout(), &records)?;
    }

    Ok(())
}

/// Lists every entry beneath `target_path` as a record, with paths rebased onto `prefix`.
/// Directories are listed too so that empty ones survive the round trip.
fn generate_records_from_path(
    target_path: &Path,
    prefix: &RemotePath,
) -> Result<Vec<MockRecord>, Box<dyn std::error::Error>> {
    let mut records = vec![];

    // Skip the first entry, which is the root directory itself
    for entry in WalkDir::new(target_path).sort_by_file_name().into_iter().skip(1) {
        let entry = entry?;
        let metadata = entry.metadata()?;
        let relative_path: RemotePath = entry.path().strip_prefix(target_path)?.try_into()?;

        records.push(MockRecord {
            path: prefix.try_join(relative_path.as_str())?,
            is_dir: metadata.is_dir(),
            size: if metadata.is_dir() { 0 } else { metadata.len() },
        });
    }

    Ok(records)
}
