use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::file::DEFAULT_CHUNK_SIZE;
use crate::upload::DEFAULT_TMP_DIR;

#[derive(Parser, Debug)]
#[command(name = "simse-files", about = "File and directory operations over a storage root")]
pub struct CliArgs {
    /// Storage root on the local disk (defaults to the working directory)
    #[arg(long, env = "SIMSE_FILES_ROOT")]
    pub root: Option<PathBuf>,

    /// Upload staging directory, relative to the storage root
    #[arg(long, default_value = DEFAULT_TMP_DIR, env = "SIMSE_FILES_TMP_DIR")]
    pub tmp_dir: String,

    /// Chunk size in bytes when streaming file content
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", env = "SIMSE_FILES_LOG_LEVEL")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the direct entries of a directory
    Ls {
        #[arg(default_value = "/")]
        path: String,
        /// Only entries matching this glob or substring
        #[arg(long)]
        filter: Option<String>,
        /// Print entry info as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Print file or directory info as JSON
    Info { path: String },
    /// Total size of a directory in bytes
    Du { path: String },
    /// Number of entries in a directory
    Count {
        path: String,
        #[arg(short, long)]
        recursive: bool,
    },
    /// Copy a file or directory
    Cp {
        source: String,
        destination: String,
    },
    /// Move a file or directory
    Mv {
        source: String,
        destination: String,
    },
    /// Merge directories into a target; the first source wins on collisions
    Merge {
        target: String,
        #[arg(required = true)]
        sources: Vec<String>,
        /// Delete each source after merging it
        #[arg(long)]
        delete: bool,
    },
    /// Create a directory and any missing parents
    Mkdir { path: String },
    /// Remove a file or directory
    Rm { path: String },
    /// Create a file from a local file or stdin; an existing file is kept
    Put {
        path: String,
        /// Read content from this local file instead of stdin
        #[arg(long)]
        from: Option<PathBuf>,
    },
    /// Write file content to stdout
    Cat { path: String },
    /// Validate local files, stage them and move them into a directory
    Upload {
        destination: String,
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Allowed mime types (defaults to image/jpeg and image/png)
        #[arg(long = "mime-type")]
        mime_types: Vec<String>,
        /// Allowed extensions
        #[arg(long = "extension")]
        extensions: Vec<String>,
        /// Maximum size in bytes
        #[arg(long)]
        max_size: Option<u64>,
        /// Accept any type and size
        #[arg(long, conflicts_with_all = ["mime_types", "extensions", "max_size"])]
        any: bool,
    },
}
