//! `bd merge-file` -- the git merge driver entry point.
//!
//! Invoked by git as `bd merge-file %A %O %B`; merges theirs into ours by
//! content-hash union and leaves the result in %A.

use std::path::Path;

use crate::cli::MergeFileArgs;
use crate::output::{CliError, CliResult};

pub fn run(args: &MergeFileArgs) -> CliResult<()> {
    beads_federation::merge::merge_files(
        Path::new(&args.ours),
        Path::new(&args.base),
        Path::new(&args.theirs),
    )
    .map_err(CliError::internal)
}
