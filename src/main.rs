#![allow(clippy::print_stderr)]
#![allow(clippy::implicit_return)]
#![allow(clippy::question_mark_used)]
#![allow(clippy::std_instead_of_core)]

use clap::{ArgAction, CommandFactory, Parser, ValueHint, value_parser};
use clap_complete::aot::{Shell, generate};
use dirstream::{
    DirStream, DirStreamError, FileType, InjectionMode, ListingOptions, SyntheticEntry,
};
use std::io::{BufWriter, Write, stdout};
use std::path::PathBuf;

#[cfg(not(any(target_os = "linux", target_os = "android")))]
compile_error!("the dirstream binary reads directories with getdents64 and only builds on Linux or Android");

#[cfg(all(feature = "mimalloc", any(target_os = "linux", target_os = "android")))]
#[global_allocator]
static ALLOC: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[allow(clippy::struct_excessive_bools)]
///List a directory through the batched getdents64 stream.
pub struct Args {
    #[arg(
        value_name = "PATH",
        help = "Directory to list (defaults to the current directory)",
        value_hint = ValueHint::DirPath,
        default_value = ".",
        index = 1
    )]
    directory: PathBuf,

    #[arg(
        short = 'i',
        long = "inject",
        value_name = "NAME",
        help = "Serve one extra synthetic entry with this name, eg -i '!'"
    )]
    inject: Option<String>,

    #[arg(
        long = "on-disk",
        requires = "inject",
        default_value_t = false,
        help = "Create the synthetic entry in the directory itself.\nThis modifies the directory being listed!"
    )]
    on_disk: bool,

    #[arg(
        long = "inject-file",
        requires = "inject",
        default_value_t = false,
        help = "Make the synthetic entry a regular file instead of a directory"
    )]
    inject_file: bool,

    #[arg(
        short = 'A',
        long = "almost-all",
        default_value_t = false,
        help = "Do not list the . and .. entries"
    )]
    skip_dots: bool,

    #[arg(
        short = 'l',
        long = "long",
        default_value_t = false,
        help = "Print the inode number and mode before each name"
    )]
    long: bool,

    #[arg(
        short = 'v',
        long = "verbose",
        action = ArgAction::Count,
        help = "Log more (-v debug, -vv trace), RUST_LOG overrides"
    )]
    verbose: u8,

    #[arg(
        long = "generate",
        action = ArgAction::Set,
        value_parser = value_parser!(Shell),
        help = "Generate shell completions"
    )]
    generate: Option<Shell>,
}

impl Args {
    fn listing_options(&self) -> ListingOptions {
        let options = ListingOptions::default().skip_dot_entries(self.skip_dots);
        let Some(name) = self.inject.as_ref() else {
            return options;
        };

        let file_type = if self.inject_file {
            FileType::RegularFile
        } else {
            FileType::Directory
        };
        let mode = if self.on_disk {
            InjectionMode::OnDisk
        } else {
            InjectionMode::Virtual
        };
        options.with_synthetic(
            SyntheticEntry::new(name.as_str())
                .with_file_type(file_type)
                .with_mode(mode),
        )
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn main() -> Result<(), DirStreamError> {
    let args = Args::parse();

    if let Some(generator) = args.generate {
        let mut cmd = Args::command();
        let cmd_clone = cmd.clone();
        generate(
            generator,
            &mut cmd,
            cmd_clone.get_name().to_owned(),
            &mut stdout(),
        );
        return Ok(());
    }

    init_logging(args.verbose);

    let stream = DirStream::open_with(&args.directory, &args.listing_options()).map_err(|e| {
        eprintln!("{}: {e}", args.directory.display());
        e
    })?;

    let mut out = BufWriter::new(stdout().lock());
    for entry in stream.entries() {
        let entry = entry?;
        let written = if args.long {
            writeln!(out, "{:>20} {:>7o} {}", entry.ino(), entry.mode(), entry.name())
        } else {
            writeln!(out, "{}", entry.name())
        };
        if let Err(error) = written {
            // the reader went away (eg `| head`), nothing left to do
            if error.kind() == std::io::ErrorKind::BrokenPipe {
                break;
            }
            return Err(error.into());
        }
    }
    stream.close();

    match out.flush() {
        Err(error) if error.kind() != std::io::ErrorKind::BrokenPipe => Err(error.into()),
        _ => Ok(()),
    }
}
