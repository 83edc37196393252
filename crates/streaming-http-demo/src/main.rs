//! streaming-http-demo: run several concurrent SSE requests through one correlator.
//!
//! Usage:
//!   streaming-http-demo --url http://localhost:3001/api/v1/ai-proxy/chat --count 3
//!   streaming-http-demo --prompt "Tell me a joke" --cancel-after-ms 1500
//!   streaming-http-demo --method GET --url http://localhost:8080/events

use std::io::Write as _;
use std::time::Duration;

use clap::Parser;
use streaming_http::prelude::*;
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(
    name = "streaming-http-demo",
    about = "Start concurrent server-sent-event requests and print their lifecycle."
)]
struct Cli {
    /// Endpoint that answers with `text/event-stream`.
    #[arg(long, default_value = "http://localhost:3001/api/v1/ai-proxy/chat")]
    url: String,

    /// HTTP method. The body is only sent for non-GET requests.
    #[arg(long, default_value = "POST")]
    method: String,

    /// User prompt, wrapped in a chat `messages` body.
    #[arg(long, default_value = "Say hello in one sentence.")]
    prompt: String,

    /// Raw JSON body; overrides `--prompt`.
    #[arg(long, value_name = "JSON")]
    body: Option<String>,

    /// Number of concurrent requests.
    #[arg(long, default_value_t = 1)]
    count: usize,

    /// Bearer token (falls back to $STREAMING_HTTP_BEARER_TOKEN).
    #[arg(long)]
    token: Option<String>,

    /// Cancel everything still running after this many milliseconds.
    #[arg(long, value_name = "MS")]
    cancel_after_ms: Option<u64>,

    /// Identifier strategy: random, content-hash or content-hash-timestamp.
    #[arg(long)]
    id_strategy: Option<IdStrategy>,

    /// Print every fragment as it arrives instead of only the final text.
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    streaming_http::init_tracing();
    let cli = Cli::parse();

    let mut config = CorrelatorConfig::from_env()?;
    if let Some(strategy) = cli.id_strategy {
        config = config.id_strategy(strategy);
    }
    let correlator = Correlator::with_http(config, HttpTransportConfig::from_env()?)?;

    let body = match &cli.body {
        Some(raw) => serde_json::from_str(raw)?,
        None => serde_json::json!({
            "messages": [{ "role": "user", "content": cli.prompt }]
        }),
    };
    let token = cli
        .token
        .clone()
        .or_else(|| std::env::var("STREAMING_HTTP_BEARER_TOKEN").ok());

    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<(RequestId, String)>();
    let mut started = 0usize;
    for index in 0..cli.count.max(1) {
        let mut spec = RequestSpec::new(cli.url.clone())
            .method(cli.method.clone())
            .json(body.clone());
        if let Some(token) = &token {
            spec = spec.bearer_auth(token);
        }
        let id = correlator
            .start(spec, listeners(index, cli.verbose, done_tx.clone()))
            .await?;
        tracing::info!(index, hash_id = %id, "request started");
        started += 1;
    }
    drop(done_tx);

    let deadline = async {
        match cli.cancel_after_ms {
            Some(ms) => tokio::time::sleep(Duration::from_millis(ms)).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    let mut finished = 0usize;
    let mut failed = false;
    let mut deadline_hit = false;
    while finished < started {
        tokio::select! {
            outcome = done_rx.recv() => {
                let Some((id, summary)) = outcome else { break };
                println!("[{id}] {summary}");
                failed |= summary.starts_with("error");
                finished += 1;
            }
            _ = &mut deadline, if !deadline_hit => {
                deadline_hit = true;
                let cancelled = correlator.cancel_all().await?;
                tracing::info!(cancelled, "deadline reached");
            }
            _ = tokio::signal::ctrl_c() => {
                let cancelled = correlator.cancel_all().await?;
                tracing::info!(cancelled, "interrupted");
            }
        }
    }

    if failed {
        std::process::exit(1);
    }
    Ok(())
}

fn listeners(
    index: usize,
    verbose: bool,
    done: mpsc::UnboundedSender<(RequestId, String)>,
) -> StreamListeners {
    let (on_complete, on_error, on_close) = (done.clone(), done.clone(), done);
    StreamListeners::new()
        .on_open(move |id| println!("[{id}] open (request #{index})"))
        .on_message(move |delta| {
            if verbose && let Some(content) = &delta.content {
                print!("{content}");
                let _ = std::io::stdout().flush();
            }
        })
        .on_complete(move |completion| {
            let _ = on_complete.send((
                completion.id.clone(),
                format!("complete: {}", completion.text),
            ));
        })
        .on_error(move |failure| {
            let _ = on_error.send((failure.id.clone(), format!("error: {}", failure.message)));
        })
        .on_close(move |notice| {
            let _ = on_close.send((notice.id.clone(), format!("closed ({:?})", notice.reason)));
        })
}
