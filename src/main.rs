use std::{env, fs, process::ExitCode, time::Instant};

use topic_lens::{
    assign, rank_terms, score_topics, sweep, topic_diversity, CoherenceConfig, Corpus, LdaConfig, ModelCheckpoint,
    TopicModel, TopicOrder, Vocabulary, VocabularyConfig,
};
use tracing::{error, info, warn};

// 表示する上位語の数
const SHOWN_TERMS: usize = 10;

struct Options {
    input: String,
    k_values: Vec<usize>,
    seed: u64,
    iterations: usize,
    lambda: f64,
    min_doc_freq: usize,
    max_doc_freq_fraction: f64,
    checkpoint: Option<String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            input: String::new(),
            k_values: vec![2, 4, 6, 8, 10],
            seed: 0,
            iterations: 1000,
            lambda: 0.6,
            min_doc_freq: 2,
            max_doc_freq_fraction: 0.5,
            checkpoint: None,
        }
    }
}

fn parse_list(value: &str) -> Result<Vec<usize>, String> {
    value
        .split(',')
        .map(|s| s.trim().parse::<usize>().map_err(|e| format!("bad K value {:?}: {}", s, e)))
        .collect()
}

fn parse_value<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, String>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse::<T>().map_err(|e| format!("bad value for {}: {}", name, e))
}

// 環境変数 -> コマンドライン引数の順で上書き
fn parse_options() -> Result<Option<Options>, String> {
    let mut opts = Options::default();
    if let Ok(v) = env::var("TOPIC_K_VALUES") { opts.k_values = parse_list(&v)?; }
    if let Ok(v) = env::var("TOPIC_SEED") { opts.seed = parse_value("TOPIC_SEED", &v)?; }
    if let Ok(v) = env::var("TOPIC_ITERATIONS") { opts.iterations = parse_value("TOPIC_ITERATIONS", &v)?; }
    if let Ok(v) = env::var("TOPIC_LAMBDA") { opts.lambda = parse_value("TOPIC_LAMBDA", &v)?; }

    let mut args = env::args().skip(1);
    while let Some(a) = args.next() {
        let mut next = |flag: &str| args.next().ok_or_else(|| format!("{} requires a value", flag));
        match a.as_str() {
            "--k" => opts.k_values = parse_list(&next("--k")?)?,
            "--seed" => opts.seed = parse_value("--seed", &next("--seed")?)?,
            "--iterations" => opts.iterations = parse_value("--iterations", &next("--iterations")?)?,
            "--lambda" => opts.lambda = parse_value("--lambda", &next("--lambda")?)?,
            "--min-df" => opts.min_doc_freq = parse_value("--min-df", &next("--min-df")?)?,
            "--max-df" => opts.max_doc_freq_fraction = parse_value("--max-df", &next("--max-df")?)?,
            "--save" => opts.checkpoint = Some(next("--save")?),
            "-h" | "--help" => {
                print_usage();
                return Ok(None);
            }
            other => {
                if opts.input.is_empty() { opts.input = other.to_string(); } else { warn!(arg = other, "extra argument ignored"); }
            }
        }
    }
    if opts.input.is_empty() {
        print_usage();
        return Err("no input file".to_string());
    }
    Ok(Some(opts))
}

fn print_usage() {
    eprintln!("Usage: topic-lens FILE [--k 2,4,6] [--seed N] [--iterations N] [--lambda X] [--min-df N] [--max-df X] [--save PATH]");
    eprintln!("FILE holds one document per line, tokens separated by whitespace.");
    eprintln!("Env overrides: TOPIC_K_VALUES, TOPIC_SEED, TOPIC_ITERATIONS, TOPIC_LAMBDA. Log level: RUST_LOG.");
}

fn run(opts: Options) -> Result<(), Box<dyn std::error::Error>> {
    let start = Instant::now();
    let text = fs::read_to_string(&opts.input)?;
    let documents: Vec<Vec<&str>> = text.lines().map(|line| line.split_whitespace().collect()).collect();
    info!(path = %opts.input, documents = documents.len(), "loaded documents");

    let vocab_config = VocabularyConfig::default()
        .min_doc_freq(opts.min_doc_freq)
        .max_doc_freq_fraction(opts.max_doc_freq_fraction);
    let vocabulary = Vocabulary::build(&documents, &vocab_config)?;
    let corpus = Corpus::encode(&documents, &vocabulary);
    info!(vocab = vocabulary.len(), tokens = corpus.total_tokens(), "corpus encoded");

    let base = LdaConfig::default().random_seed(opts.seed).max_iterations(opts.iterations);
    let coherence = CoherenceConfig::default();
    let results = sweep(&corpus, &vocabulary, &opts.k_values, &base, &coherence)?;
    println!("K\tcoherence");
    for (k, value) in &results {
        println!("{}\t{:.4}", k, value);
    }

    // 選択はアナリスト任せだが、デモでは最大値を使う
    let Some(&(k, _)) = results
        .iter()
        .max_by(|a, b| a.1.total_cmp(&b.1).then(b.0.cmp(&a.0)))
    else {
        return Ok(());
    };
    let model = TopicModel::train(&corpus, &base.with_topics(k))?;
    let report = score_topics(&model, &corpus, &vocabulary, &coherence)?;
    info!(
        k,
        coherence = report.mean,
        perplexity = model.perplexity(&corpus)?,
        diversity = topic_diversity(&model, SHOWN_TERMS),
        converged = model.converged(),
        "final model"
    );

    let order = TopicOrder::by_prevalence(&model, &corpus)?;
    let assignments = assign(&model, &corpus)?;
    let rankings = rank_terms(&model, &vocabulary, &corpus.marginal_term_distribution(), opts.lambda)?;
    for ranking in &rankings {
        let terms: Vec<&str> = ranking.terms.iter().take(SHOWN_TERMS).map(|t| t.token.as_str()).collect();
        let members = assignments.iter().filter(|a| a.topic == ranking.topic).count();
        println!(
            "topic {} (view {})\tdocs={}\tcoherence={:.4}\t{}",
            ranking.topic,
            order.visual_id(ranking.topic).unwrap_or(0),
            members,
            report.topics[ranking.topic].score,
            terms.join(" ")
        );
    }
    println!("document\ttopic\tprobability");
    for a in &assignments {
        println!("{}\t{}\t{:.4}", a.document, a.topic, a.distribution[a.topic]);
    }

    if let Some(path) = &opts.checkpoint {
        let file = fs::File::create(path)?;
        ModelCheckpoint::new(vocabulary, model)?.to_writer(std::io::BufWriter::new(file))?;
        info!(path = %path, "checkpoint written");
    }
    info!(elapsed_ms = start.elapsed().as_millis() as u64, "done");
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("topic_lens=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let opts = match parse_options() {
        Ok(Some(opts)) => opts,
        Ok(None) => return ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    match run(opts) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
