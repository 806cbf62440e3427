//! morphtag command line: `train` builds a model from an analysed corpus,
//! `tag` labels raw text with a trained model.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use morphtag_core::{
    AnalysisQueue, Configuration, CorpusReader, InputSeparators, Model, MorphAnalyzer,
    MorphTagger, NullAnalyzer, RareFilter, TableAnalyzer,
};

#[derive(Parser)]
#[command(
    name = "morphtag",
    version,
    about = "Hybrid statistical morphological tagger and lemmatizer"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Train a model on an analysed corpus of word#lemma#tag triples
    Train(TrainArgs),
    /// Tag pre-tokenized text, one sentence per line
    Tag(TagArgs),
}

#[derive(Args)]
struct TrainArgs {
    /// Model file path; an existing model is trained incrementally
    #[arg(short, long)]
    model: PathBuf,

    /// Order of the tag transition model (2 = trigram tagging)
    #[arg(short = 't', long, default_value_t = 2)]
    tag_order: usize,

    /// Order of the emission model
    #[arg(short = 'e', long, default_value_t = 2)]
    emission_order: usize,

    /// Maximum suffix length of the unknown-word guesser
    #[arg(short = 's', long, default_value_t = 10)]
    suffix_length: usize,

    /// Frequency threshold below which words feed the suffix guesser
    #[arg(short = 'r', long, default_value_t = 10)]
    rare_frequency: u32,

    /// Treat "rare" as rare lemma instead of rare word form
    #[arg(long)]
    rare_by_lemma: bool,

    /// Field separator between word, lemma and tag
    #[arg(short = 'S', long, default_value = "#")]
    separator: String,

    /// Training corpus; standard input when omitted
    #[arg(short = 'i', long)]
    input_file: Option<PathBuf>,

    /// Input encoding (only UTF-8 is supported)
    #[arg(short = 'c', long)]
    encoding: Option<String>,

    /// XML configuration with tag/lemma mappings
    #[arg(short = 'f', long)]
    config_file: Option<String>,
}

#[derive(Args)]
struct TagArgs {
    /// Model file path
    #[arg(short, long)]
    model: PathBuf,

    /// Morphological analyzer: 'none', 'integrated' or a TSV table path
    #[arg(short = 'a', long, default_value = "none")]
    analyzer: String,

    /// Output POS tags only, skip lemmatization
    #[arg(long)]
    only_pos_tags: bool,

    /// Maximum number of tags guessed for an unknown token
    #[arg(short = 'g', long, default_value_t = 10)]
    max_guessed: usize,

    /// Number of alternative tag sequences to emit
    #[arg(short = 'n', long, default_value_t = 1)]
    max_results: usize,

    /// Beam width as a probability ratio; its natural log bounds the beam
    #[arg(short = 'b', long, default_value_t = 1000.0)]
    beam_theta: f64,

    /// Use a fixed-size beam instead of the ratio threshold
    #[arg(short = 'd', long)]
    beam_decoder: bool,

    /// Beam size of the fixed-size mode
    #[arg(long, default_value_t = 10)]
    beam_size: usize,

    /// Output file; standard output when omitted
    #[arg(short = 'o', long)]
    output_file: Option<PathBuf>,

    /// Input file; standard input when omitted
    #[arg(short = 'i', long)]
    input_file: Option<PathBuf>,

    /// Input encoding (only UTF-8 is supported)
    #[arg(short = 'c', long)]
    encoding: Option<String>,

    /// Bracket tokens of inline analyses, split by the spec's first char
    #[arg(long, default_value = " {{ || }} [")]
    input_separator: String,

    /// Field separator between word, lemma and tag
    #[arg(short = 'S', long, default_value = "#")]
    separator: String,

    /// XML configuration with mappings, guessed marker and weights
    #[arg(short = 'f', long)]
    config_file: Option<String>,

    /// Colorize output when writing to standard output
    #[arg(long)]
    color_stdout: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let _ = ctrlc::set_handler(|| {
        eprintln!("\nBye!");
        std::process::exit(0);
    });

    if let Err(e) = run() {
        eprintln!("morphtag: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    match Cli::parse().command {
        Command::Train(args) => train(args),
        Command::Tag(args) => tag(args),
    }
}

fn warn_encoding(encoding: &Option<String>) {
    if let Some(enc) = encoding {
        if !enc.eq_ignore_ascii_case("utf-8") && !enc.eq_ignore_ascii_case("utf8") {
            tracing::warn!("only UTF-8 input is supported; ignoring encoding '{}'", enc);
        }
    }
}

fn load_configuration(path: &Option<String>) -> Result<Configuration> {
    match path {
        Some(p) => {
            Configuration::from_xml_file(p).with_context(|| format!("configuration file '{}'", p))
        }
        None => Ok(Configuration::default()),
    }
}

fn train(args: TrainArgs) -> Result<()> {
    warn_encoding(&args.encoding);
    let conf = load_configuration(&args.config_file)?;

    let text = match &args.input_file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("training input '{}'", path.display()))?,
        None => io::read_to_string(io::stdin()).context("reading training input")?,
    };
    let reader = CorpusReader::new(&args.separator, "\n");
    let (document, skipped) = reader.read(&text);

    let mut model = if args.model.is_file() {
        eprintln!("Reading model...");
        Model::load(&args.model)?
    } else {
        Model::new(
            args.tag_order,
            args.emission_order,
            args.suffix_length,
            args.rare_frequency,
        )
    };
    if args.rare_by_lemma {
        model.rare_filter = RareFilter::LemmaFrequency;
    }

    eprintln!("Training model...");
    model.record_skipped_sentences(skipped);
    let lemma_mapper = conf.lemma_mapper();
    model.train(&document, lemma_mapper.as_ref());
    eprintln!("{}", model.stats().report(model.distinct_tags()));

    eprintln!("Writing model...");
    model.save(&args.model)?;
    eprintln!("Done!");
    Ok(())
}

fn tag(args: TagArgs) -> Result<()> {
    warn_encoding(&args.encoding);
    let conf = load_configuration(&args.config_file)?;

    eprintln!("Reading model...");
    let model = Model::load(&args.model)?;
    eprintln!("Compiling model...");
    let compiled = model.compile(&conf);

    let analyzer: Box<dyn MorphAnalyzer> = match args.analyzer.as_str() {
        "none" => Box::new(NullAnalyzer),
        "integrated" => {
            let err = morphtag_core::Error::AnalyzerUnavailable(
                "no integrated analyzer is built into this binary".to_string(),
            );
            tracing::warn!("{}; using none", err);
            Box::new(NullAnalyzer)
        }
        path => {
            eprintln!("Using morphological table at: {}.", path);
            Box::new(
                TableAnalyzer::from_path(path)
                    .with_context(|| format!("morphological table '{}'", path))?,
            )
        }
    };

    let separators = InputSeparators::parse(&args.input_separator)?;
    let queue = AnalysisQueue::new(separators);
    let beam_size = args.beam_decoder.then_some(args.beam_size);
    let tagger = MorphTagger::new(
        &compiled,
        analyzer.as_ref(),
        args.beam_theta.ln(),
        10f64.ln(),
        args.max_guessed,
        beam_size,
        !args.only_pos_tags,
        &args.separator,
        queue,
    );

    let reader: Box<dyn BufRead> = match &args.input_file {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("input file '{}'", path.display()))?,
        )),
        None => Box::new(io::stdin().lock()),
    };

    eprintln!("Tagging:");
    match &args.output_file {
        Some(path) => {
            let mut writer = BufWriter::new(
                File::create(path)
                    .with_context(|| format!("output file '{}'", path.display()))?,
            );
            tagger.tag_stream(reader, &mut writer, args.max_results)?;
        }
        None if args.color_stdout => {
            tag_colored(&tagger, reader, args.max_results, &args.separator, args.only_pos_tags)?;
        }
        None => {
            let mut writer = io::stdout().lock();
            tagger.tag_stream(reader, &mut writer, args.max_results)?;
        }
    }
    Ok(())
}

fn tag_colored<R: BufRead>(
    tagger: &MorphTagger<'_>,
    reader: R,
    max_results: usize,
    sep: &str,
    only_pos_tags: bool,
) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for line in reader.lines() {
        let line = morphtag_core::utils::normalize(&line?);
        let tokens: Vec<String> = line.split_whitespace().map(str::to_string).collect();
        if tokens.is_empty() {
            writeln!(out)?;
            continue;
        }
        let rendered: Vec<String> = tagger
            .tag_sentence(&tokens, max_results)
            .iter()
            .map(|(sentence, weight)| {
                let text = sentence
                    .iter()
                    .map(|t| {
                        if only_pos_tags {
                            format!(
                                "{}{}{}",
                                t.word.as_str().white(),
                                sep.bright_black(),
                                t.tag.as_str().cyan()
                            )
                        } else {
                            format!(
                                "{}{}{}{}{}",
                                t.word.as_str().white(),
                                sep.bright_black(),
                                t.lemma.as_str().red(),
                                sep.bright_black(),
                                t.tag.as_str().cyan()
                            )
                        }
                    })
                    .collect::<Vec<String>>()
                    .join(" ");
                if max_results > 1 {
                    format!("{}$${}$$", text, weight)
                } else {
                    text
                }
            })
            .collect();
        writeln!(out, "{}", rendered.join("\t"))?;
    }
    out.flush()?;
    Ok(())
}
