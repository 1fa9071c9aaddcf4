use clap::{Args, Parser as ClapParser, Subcommand};
use std::io::{self, Read};
use unq_lang::RunOptions;
use unq_lang::cli::{self, CliError, Input, InputFormat, RunCommand};

#[derive(ClapParser)]
#[command(name = "unq")]
#[command(about = "unq - Query and reshape JSON documents with JSON templates")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct TemplateArgs {
    /// The template, inline
    #[arg(short = 'c', long = "command")]
    command: Option<String>,

    /// File holding the template
    #[arg(short = 'f', long = "file")]
    file: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a template over JSON or CSV input
    Run {
        #[command(flatten)]
        template: TemplateArgs,

        /// Keep null values in the output
        #[arg(short = 'n', long)]
        show_nulls: bool,

        /// Read the inputs as CSV
        #[arg(long)]
        csv: bool,

        /// CSV delimiter
        #[arg(long, default_value = ",")]
        delim: String,

        /// CSV inputs have no header row
        #[arg(long)]
        csv_no_headers: bool,

        /// Print the result on one line
        #[arg(long)]
        compact: bool,

        /// Input files (reads from stdin if none are given)
        files: Vec<String>,
    },

    /// Only compile the template
    Check {
        #[command(flatten)]
        template: TemplateArgs,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            template,
            show_nulls,
            csv,
            delim,
            csv_no_headers,
            compact,
            files,
        } => {
            let format = if csv {
                InputFormat::Csv {
                    delim,
                    headers: !csv_no_headers,
                }
            } else {
                InputFormat::Json
            };
            run(template, files, format, show_nulls, !compact)
        }
        Commands::Check { template } => {
            read_template(template).and_then(|t| cli::execute_check(&t))
        }
    };

    match result {
        Ok(output) => println!("{}", output),
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}

fn read_template(args: TemplateArgs) -> Result<String, CliError> {
    match (args.command, args.file) {
        (Some(template), _) => Ok(template),
        (None, Some(path)) => Ok(cli::read_input(&path)?.text),
        (None, None) => Err(CliError::NoInput),
    }
}

fn run(
    template: TemplateArgs,
    files: Vec<String>,
    format: InputFormat,
    show_nulls: bool,
    pretty: bool,
) -> Result<String, CliError> {
    let template = read_template(template)?;
    let inputs = if files.is_empty() {
        if atty::is(atty::Stream::Stdin) {
            return Err(CliError::NoInput);
        }
        let mut text = String::new();
        io::stdin().read_to_string(&mut text)?;
        vec![Input {
            name: "stdin".to_string(),
            text,
        }]
    } else {
        files
            .iter()
            .map(|f| cli::read_input(f))
            .collect::<Result<Vec<_>, _>>()?
    };

    cli::execute_run(&RunCommand {
        template,
        inputs,
        format,
        options: RunOptions {
            show_nulls,
            ..RunOptions::default()
        },
        pretty,
    })
}
