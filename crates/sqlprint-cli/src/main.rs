use clap::{Parser, Subcommand};
use colored::Colorize;
use sqlprint_core::{classify, Digest, Options};
use std::borrow::Cow;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process;

/// sqlprint — MySQL query fingerprinting
///
/// Reduce queries to their structural shape and group query logs by it.
#[derive(Parser)]
#[command(name = "sqlprint", version, about, long_about = None)]
struct Cli {
    /// Suppress normal output; rely on the exit code
    #[arg(long, global = true)]
    quiet: bool,

    /// TOML options file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Reject queries longer than this many bytes
    #[arg(long, global = true)]
    max_query_bytes: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the fingerprint of a query
    Fingerprint {
        /// Raw query text
        query: String,
        /// Output as JSON (origin, fingerprint, hash)
        #[arg(long)]
        json: bool,
    },

    /// Print the SHA-256 hash of a query's fingerprint
    Hash {
        /// Raw query text
        query: String,
    },

    /// Group a query log by fingerprint (one query per line, `-` for stdin)
    Digest {
        /// Path to query log
        file: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
        /// Only report the N most frequent shapes
        #[arg(long)]
        top: Option<usize>,
    },

    /// Exit 0 if two queries share a fingerprint, 1 otherwise
    Compare {
        /// First query
        query_a: String,
        /// Second query
        query_b: String,
    },

    /// Show version information
    Version,
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    let opts = match load_options(&cli) {
        Ok(opts) => opts,
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            process::exit(2);
        }
    };

    let exit_code = match cli.command {
        Commands::Fingerprint { query, json } => cmd_fingerprint(&query, json, cli.quiet, &opts),
        Commands::Hash { query } => cmd_hash(&query, cli.quiet, &opts),
        Commands::Digest { file, json, top } => cmd_digest(&file, json, top, cli.quiet, &opts),
        Commands::Compare { query_a, query_b } => cmd_compare(&query_a, &query_b, cli.quiet, &opts),
        Commands::Version => {
            println!(
                "sqlprint {} (sqlprint-core {})",
                env!("CARGO_PKG_VERSION"),
                env!("CARGO_PKG_VERSION")
            );
            0
        }
    };

    process::exit(exit_code);
}

/// Logs go to stderr; stdout carries only results.
fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sqlprint_core=warn,sqlprint_cli=warn".into()),
        )
        .with_writer(io::stderr)
        .init();
}

fn load_options(cli: &Cli) -> sqlprint_core::Result<Options> {
    let mut opts = match &cli.config {
        Some(path) => Options::load(path)?,
        None => Options::default(),
    };
    if cli.max_query_bytes.is_some() {
        opts.max_query_bytes = cli.max_query_bytes;
    }
    tracing::debug!(?opts, "options loaded");
    Ok(opts)
}

fn report_error(e: &sqlprint_core::Error) -> i32 {
    eprintln!("{} {}", "error:".red().bold(), e);
    2
}

fn cmd_fingerprint(query: &str, json: bool, quiet: bool, opts: &Options) -> i32 {
    let fp = match classify(query, opts) {
        Ok(fp) => fp,
        Err(e) => return report_error(&e),
    };
    if quiet {
        return 0;
    }
    if json {
        let output = serde_json::json!({
            "origin": fp.origin.to_string(),
            "fingerprint": fp.text,
            "hash": fp.hash,
        });
        println!("{}", serde_json::to_string_pretty(&output).unwrap_or_default());
    } else {
        println!("{}", fp.text);
    }
    0
}

fn cmd_hash(query: &str, quiet: bool, opts: &Options) -> i32 {
    match classify(query, opts) {
        Ok(fp) => {
            if !quiet {
                println!("{}", fp.hash);
            }
            0
        }
        Err(e) => report_error(&e),
    }
}

fn cmd_compare(query_a: &str, query_b: &str, quiet: bool, opts: &Options) -> i32 {
    let (a, b) = match (classify(query_a, opts), classify(query_b, opts)) {
        (Ok(a), Ok(b)) => (a, b),
        (Err(e), _) | (_, Err(e)) => return report_error(&e),
    };
    let same = a.text == b.text;
    if !quiet {
        if same {
            println!("{} {}", "same".green().bold(), a.text);
        } else {
            println!("{}", "different".yellow().bold());
            println!("  a: {}", a.text);
            println!("  b: {}", b.text);
        }
    }
    if same {
        0
    } else {
        1
    }
}

fn open_log(file: &Path) -> io::Result<Box<dyn BufRead>> {
    if file == Path::new("-") {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }
    Ok(Box::new(BufReader::new(std::fs::File::open(file)?)))
}

fn cmd_digest(file: &Path, json: bool, top: Option<usize>, quiet: bool, opts: &Options) -> i32 {
    let mut reader = match open_log(file) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("{} {}: {}", "error:".red().bold(), file.display(), e);
            return 2;
        }
    };

    // Logs are byte streams; invalid UTF-8 is replaced, not fatal.
    let mut digest = Digest::new(opts.clone());
    let mut buf = Vec::new();
    let mut lineno = 0u64;
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => lineno += 1,
            Err(e) => {
                eprintln!("{} {}: {}", "error:".red().bold(), file.display(), e);
                return 2;
            }
        }
        let line = String::from_utf8_lossy(&buf);
        if let Cow::Owned(_) = line {
            tracing::warn!(line = lineno, "invalid UTF-8 replaced");
        }
        let line = line.trim_end_matches(&['\n', '\r'][..]);
        if line.trim().is_empty() {
            continue;
        }
        digest.add(line);
    }

    if quiet {
        return 0;
    }

    let classes = digest.classes();
    let shown = &classes[..top.unwrap_or(classes.len()).min(classes.len())];

    if json {
        let output = serde_json::json!({
            "total": digest.total(),
            "distinct": digest.distinct(),
            "skipped": digest.skipped(),
            "classes": shown,
        });
        println!("{}", serde_json::to_string_pretty(&output).unwrap_or_default());
        return 0;
    }

    println!(
        "{} queries, {} distinct, {} skipped",
        digest.total(),
        digest.distinct(),
        digest.skipped()
    );
    for class in shown {
        println!(
            "{:>8}  {}  {}",
            class.count.to_string().bold(),
            class.hash[..16].dimmed(),
            class.fingerprint
        );
    }
    0
}
