use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::{Error, anyhow};
use clap::{Parser, Subcommand};
use colshade::{
    Format,
    column_shadows::{ColumnShadowSet, ShadowError, exit_code, exit_code_description},
};
use log::LevelFilter;
use log4rs::{
    append::console::{ConsoleAppender, Target},
    config::{Appender, Config, Root},
    encode::pattern::PatternEncoder,
};

#[derive(Parser)]
#[command(version, about = "Inspect and edit column shadow files")]
struct Cli {
    /// Maximum level of log messages written to stderr
    #[arg(long, global = true, default_value_t = LevelFilter::Warn)]
    log_level: LevelFilter,

    /// log4rs configuration file, replaces the built-in stderr logger
    #[arg(long, global = true)]
    log_config: Option<PathBuf>,

    /// Persistence format of the shadow files
    #[arg(short, long, global = true, value_enum, default_value_t = Format::Text)]
    format: Format,

    /// Number of columns tracked by the shadow set
    #[arg(short, long, global = true)]
    columns: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a shadow file with every column unshaded
    New { file: PathBuf },

    /// Print the column count and the shaded columns
    Info {
        file: PathBuf,

        /// Print a JSON summary instead of plain text
        #[arg(long)]
        json: bool,
    },

    /// Shade columns
    Shade {
        file: PathBuf,

        #[arg(required = true)]
        indices: Vec<usize>,
    },

    /// Unshade columns
    Unshade {
        file: PathBuf,

        #[arg(required = true)]
        indices: Vec<usize>,
    },

    /// Unshade every column
    Clear { file: PathBuf },

    /// Change the number of tracked columns
    Resize { file: PathBuf, new_columns: usize },

    /// Write the union of several shadow files
    Merge {
        output: PathBuf,

        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },

    /// Convert a shadow file into another format
    Convert {
        input: PathBuf,
        output: PathBuf,

        #[arg(long, value_enum)]
        from: Format,

        #[arg(long, value_enum)]
        to: Format,
    },
}

fn main() -> ExitCode {
    let args = Cli::parse();

    if let Err(e) = init_logging(args.log_level, args.log_config.as_deref()) {
        eprintln!("Could not initialize logging: {e:#}");
        return ExitCode::from(exit_code::OTHER_FAILURE as u8);
    }

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let code = exit_code_of(&e);
            eprintln!("{}\n  {e:#}", exit_code_description(code));
            u8::try_from(code).map_or(ExitCode::FAILURE, ExitCode::from)
        }
    }
}

fn init_logging(level: LevelFilter, config: Option<&Path>) -> Result<(), Error> {
    if let Some(config) = config {
        return log4rs::init_file(config, Default::default());
    }

    let stderr = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new("{h({l:<5})} {t} - {m}{n}")))
        .build();

    let config = Config::builder()
        .appender(Appender::builder().build("stderr", Box::new(stderr)))
        .build(Root::builder().appender("stderr").build(level))?;

    log4rs::init_config(config)?;

    Ok(())
}

fn exit_code_of(error: &Error) -> i32 {
    if let Some(e) = error.downcast_ref::<ShadowError>() {
        e.exit_code()
    } else if error.downcast_ref::<std::io::Error>().is_some() {
        exit_code::IO_FAILURE
    } else {
        exit_code::OTHER_FAILURE
    }
}

fn run(args: Cli) -> Result<(), Error> {
    let Cli {
        format,
        columns,
        command,
        ..
    } = args;

    match command {
        Command::New { file } => {
            let columns =
                columns.ok_or_else(|| anyhow!("--columns is required to create a shadow file"))?;
            colshade::save(&ColumnShadowSet::new(columns)?, file, format)
        }
        Command::Info { file, json } => {
            let summary = colshade::open(file, format, columns)?.summary();
            if json {
                println!("{}", summary.to_json()?);
            } else {
                println!("Columns: {}", summary.columns);
                println!("Shaded:  {}", summary.shaded_count);
                for index in summary.shaded {
                    println!("{index}");
                }
            }
            Ok(())
        }
        Command::Shade { file, indices } => {
            let mut shadows = colshade::open(&file, format, columns)?;
            if columns.is_none() && format == Format::Text {
                // Text files do not record a column count, grow to fit
                grow_to_fit(&mut shadows, &indices)?;
            }
            shade_all(&mut shadows, &indices, true);
            colshade::save(&shadows, file, format)
        }
        Command::Unshade { file, indices } => {
            let mut shadows = colshade::open(&file, format, columns)?;
            shade_all(&mut shadows, &indices, false);
            colshade::save(&shadows, file, format)
        }
        Command::Clear { file } => {
            let mut shadows = colshade::open(&file, format, columns)?;
            shadows.clear_all();
            colshade::save(&shadows, file, format)
        }
        Command::Resize { file, new_columns } => {
            let mut shadows = colshade::open(&file, format, columns)?;
            shadows.resize(new_columns)?;
            colshade::save(&shadows, file, format)
        }
        Command::Merge { output, inputs } => {
            let shadows = colshade::merge(&inputs, format, columns)?;
            colshade::save(&shadows, output, format)
        }
        Command::Convert {
            input,
            output,
            from,
            to,
        } => colshade::convert(input, from, output, to, columns).map(|_| ()),
    }
}

fn grow_to_fit(shadows: &mut ColumnShadowSet, indices: &[usize]) -> Result<(), Error> {
    match indices.iter().max() {
        Some(&max) if max >= shadows.columns() => shadows.resize(max.saturating_add(1))?,
        _ => {}
    }

    Ok(())
}

fn shade_all(shadows: &mut ColumnShadowSet, indices: &[usize], should_shade: bool) {
    for &index in indices {
        if index >= shadows.columns() {
            log::warn!(
                "Ignoring column {index}, the shadow set only has {} columns",
                shadows.columns()
            );
        }
        shadows.shade_column(index, should_shade);
    }
}
