use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

use sir0_core::container::DecodeOptions;
use sir0_core::{Endianness, SchemaGrammar};

#[derive(Parser, Debug)]
#[command(
    name = "sir0-cli",
    about = "Convert SIR0 containers to and from editable XML",
    version
)]
struct Cli {
    /// Log decoder/encoder progress to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Decode a binary container into XML
    Decode(DecodeArgs),
    /// Encode an XML tree back into a binary container
    Encode(EncodeArgs),
}

#[derive(ClapArgs, Debug)]
struct DecodeArgs {
    /// Container file to decode
    input: PathBuf,
    /// Output XML path
    output: PathBuf,
    /// JSON schema file; data runs decode into typed fields
    #[arg(long)]
    schema: Option<PathBuf>,
    /// Annotate raw data blocks with ASCII comments
    #[arg(long, default_value_t = false)]
    ascii: bool,
    /// Read pointers and integers big-endian
    #[arg(long, default_value_t = false)]
    big_endian: bool,
}

#[derive(ClapArgs, Debug)]
struct EncodeArgs {
    /// XML file to encode
    input: PathBuf,
    /// Output container path
    output: PathBuf,
}

fn main() {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
    match cli.cmd {
        Cmd::Decode(a) => cmd_decode(a),
        Cmd::Encode(a) => cmd_encode(a),
    }
}

fn cmd_decode(args: DecodeArgs) {
    let data = std::fs::read(&args.input).unwrap_or_else(|e| {
        eprintln!("error reading {}: {}", args.input.display(), e);
        std::process::exit(2);
    });
    let schema = args.schema.map(|path| {
        let text = std::fs::read_to_string(&path).unwrap_or_else(|e| {
            eprintln!("error reading schema {}: {}", path.display(), e);
            std::process::exit(2);
        });
        SchemaGrammar::from_json_str(&text).unwrap_or_else(|e| {
            eprintln!("invalid schema: {}", e);
            std::process::exit(3);
        })
    });
    let opts = DecodeOptions {
        endianness: if args.big_endian {
            Endianness::Big
        } else {
            Endianness::Little
        },
        schema: schema.as_ref(),
    };
    let doc = sir0_core::decode(&data, &opts).unwrap_or_else(|e| {
        eprintln!("decode error: {}", e);
        std::process::exit(4);
    });
    let text = sir0_core::to_xml(&doc, args.ascii).unwrap_or_else(|e| {
        eprintln!("error rendering xml: {}", e);
        std::process::exit(4);
    });
    std::fs::write(&args.output, text).unwrap_or_else(|e| {
        eprintln!("error writing {}: {}", args.output.display(), e);
        std::process::exit(5);
    });
}

fn cmd_encode(args: EncodeArgs) {
    let text = std::fs::read_to_string(&args.input).unwrap_or_else(|e| {
        eprintln!("error reading {}: {}", args.input.display(), e);
        std::process::exit(2);
    });
    let doc = sir0_core::from_xml(&text).unwrap_or_else(|e| {
        eprintln!("invalid xml: {}", e);
        std::process::exit(3);
    });
    let data = sir0_core::encode(&doc).unwrap_or_else(|e| {
        eprintln!("encode error: {}", e);
        std::process::exit(4);
    });
    std::fs::write(&args.output, data).unwrap_or_else(|e| {
        eprintln!("error writing {}: {}", args.output.display(), e);
        std::process::exit(5);
    });
}
