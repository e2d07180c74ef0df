//! Command-line interface: analyze extraction XML into the serialized
//! document format, or import plain text with an optional IGT sidecar.

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};

use lineate::analyzers::{Analyzer, XYCutAnalyzer};
use lineate::error::Result;
use lineate::readers::{PdfMinerReader, Reader, TetmlReader};
use lineate::serialize::LineateDoc;
use lineate::text_import::read_and_convert;

#[derive(Parser)]
#[command(
    version,
    about = "Analyze the document structure of text extracted from a PDF"
)]
struct Cli {
    /// Increase the verbosity (can be repeated: -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ReaderArg {
    /// TETML XML
    Tetml,
    /// pdfminer XML
    Pdfminer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum AnalyzerArg {
    /// Recursive XY-cut segmentation
    Xycut,
}

#[derive(Subcommand)]
enum Command {
    /// Recover reading order and blocks from extraction XML
    Analyze {
        /// Extraction XML file (gzipped accepted)
        infile: PathBuf,
        /// Output document path
        outfile: PathBuf,
        /// Input dialect
        #[arg(short, long, value_enum, default_value_t = ReaderArg::Tetml)]
        reader: ReaderArg,
        /// Layout analyzer
        #[arg(short, long, value_enum, default_value_t = AnalyzerArg::Xycut)]
        analyzer: AnalyzerArg,
        /// Gzip the output file (appends .gz if absent)
        #[arg(short = 'z', long)]
        gzip: bool,
        /// Write per-page zone overlay SVGs
        #[arg(long)]
        debug: bool,
    },
    /// Convert a plain text file to the serialized document format
    ImportText {
        /// Plain text file
        infile: PathBuf,
        /// Output document path
        outfile: PathBuf,
        /// Plain text file containing IGT span info
        #[arg(long)]
        igt_file: Option<PathBuf>,
        /// Encoding of the input file
        #[arg(long, default_value = "utf-8")]
        encoding: String,
        /// Detect the encoding instead of trusting the label
        #[arg(short, long)]
        detect_encoding: bool,
    },
}

/// Input stem: basename with `.gz` and the final extension stripped.
fn doc_id_from_path(path: &std::path::Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = name.strip_suffix(".gz").unwrap_or(&name);
    match name.rsplit_once('.') {
        Some((stem, _)) => stem.to_string(),
        None => name.to_string(),
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Analyze {
            infile,
            mut outfile,
            reader,
            analyzer: AnalyzerArg::Xycut,
            gzip,
            debug,
        } => {
            let mut reader: Box<dyn Reader> = match reader {
                ReaderArg::Tetml => Box::new(TetmlReader::new(&infile)),
                ReaderArg::Pdfminer => Box::new(PdfMinerReader::new(&infile)),
            };
            log::info!("Analyzing {}", infile.display());
            let doc_id = doc_id_from_path(&infile);
            let doc = XYCutAnalyzer::with_debug(debug).analyze(reader.as_mut(), &doc_id)?;
            if gzip && outfile.extension().is_none_or(|ext| ext != "gz") {
                let mut name = outfile.file_name().unwrap_or_default().to_os_string();
                name.push(".gz");
                outfile.set_file_name(name);
            }
            LineateDoc::from_layout(&doc).write(&outfile, gzip)
        }
        Command::ImportText {
            infile,
            outfile,
            igt_file,
            encoding,
            detect_encoding,
        } => {
            let doc = read_and_convert(&infile, igt_file.as_deref(), &encoding, detect_encoding)?;
            doc.write(&outfile, false)
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    };
    env_logger::Builder::new().filter_level(level).init();

    if let Err(e) = run(cli) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doc_id_strips_gz_and_extension() {
        assert_eq!(doc_id_from_path(std::path::Path::new("a/b/doc.xml.gz")), "doc");
        assert_eq!(doc_id_from_path(std::path::Path::new("doc.tetml")), "doc");
        assert_eq!(doc_id_from_path(std::path::Path::new("doc")), "doc");
    }

    #[test]
    fn test_cli_parses_analyze() {
        let cli = Cli::try_parse_from([
            "lineate", "-vv", "analyze", "in.xml", "out.txt", "--reader", "pdfminer", "-z",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Analyze { reader, gzip, .. } => {
                assert_eq!(reader, ReaderArg::Pdfminer);
                assert!(gzip);
            }
            _ => panic!("expected analyze"),
        }
    }
}
