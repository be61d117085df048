//! `strata publish`, `strata read` and `strata query`.

use anyhow::{Context, Result, bail};
use serde_json::Value;
use std::path::Path;
use strata_core::{EventTopics, StrataConfig};
use strata_sql::{AuditEventHandler, QueryFilter, QueryRequest};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};

async fn connect(config: StrataConfig, topics: EventTopics) -> Result<AuditEventHandler> {
    AuditEventHandler::connect(config.handler, &config.connection_pool, topics)
        .await
        .context("Failed to open the audit event handler")
}

/// Publish every line of `file` (or stdin) as one event.
pub async fn publish(
    config_path: &Path,
    topic: &str,
    file: Option<&Path>,
    validate: bool,
) -> Result<()> {
    let (config, topics) = super::load(config_path)?;

    let validator = if validate {
        let schema = topics
            .schema(topic)
            .with_context(|| format!("No schema configured for topic '{}'", topic))?;
        Some(
            jsonschema::validator_for(schema.as_value())
                .map_err(|e| anyhow::anyhow!("Invalid JSON schema for '{}': {}", topic, e))?,
        )
    } else {
        None
    };

    let mut events = EventLines::open(file).await?;
    let handler = connect(config, topics).await?;
    let mut published = 0usize;
    let mut rejected = 0usize;

    loop {
        let (number, parsed) = match events.next_event().await {
            Ok(Some(next)) => next,
            Ok(None) => break,
            Err(e) => {
                handler.shutdown().await;
                return Err(e);
            }
        };
        let event = match parsed {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(line = number, error = %e, "Skipping malformed event");
                rejected += 1;
                continue;
            }
        };

        if let Some(validator) = &validator
            && let Some(error) = validator.iter_errors(&event).next()
        {
            tracing::warn!(
                line = number,
                path = %error.instance_path(),
                error = %error,
                "Skipping event that does not match the topic schema"
            );
            rejected += 1;
            continue;
        }

        match handler.publish(topic, event).await {
            Ok(_) => published += 1,
            Err(e) if e.is_configuration() => {
                handler.shutdown().await;
                return Err(e).context("Audit handler configuration error");
            }
            Err(e) => {
                tracing::warn!(line = number, error = %e, "Failed to publish event");
                rejected += 1;
            }
        }
    }

    handler.shutdown().await;
    println!("Published {} event(s) to '{}', rejected {}", published, topic, rejected);
    Ok(())
}

/// Print the event `id` of `topic` as pretty JSON.
pub async fn read(config_path: &Path, topic: &str, id: &str) -> Result<()> {
    let (config, topics) = super::load(config_path)?;
    let handler = connect(config, topics).await?;

    let result = handler.read(topic, id).await;
    handler.shutdown().await;

    let event = result.with_context(|| format!("Failed to read '{}' from '{}'", id, topic))?;
    println!("{}", serde_json::to_string_pretty(&event)?);
    Ok(())
}

/// Run `request` and print each event on its own line.
pub async fn query(config_path: &Path, topic: &str, request: &QueryRequest) -> Result<()> {
    let (config, topics) = super::load(config_path)?;
    let handler = connect(config, topics).await?;

    let mut lines = Vec::new();
    let result = handler
        .query(topic, request, |event| lines.push(event.to_string()))
        .await;
    handler.shutdown().await;

    let response = result.with_context(|| format!("Failed to query '{}'", topic))?;
    for line in &lines {
        println!("{}", line);
    }
    eprintln!("{} result(s)", response.total_paged_results);
    if let Some(cookie) = response.paged_results_cookie
        && request.page_size.is_some()
    {
        eprintln!("Next page: --offset {}", cookie);
    }
    Ok(())
}

/// Build a query request from command line arguments.
pub fn query_request(
    filters: &[String],
    sort: &[String],
    page_size: Option<u32>,
    offset: u32,
) -> Result<QueryRequest> {
    let mut equals = filters
        .iter()
        .map(|f| parse_equals(f))
        .collect::<Result<Vec<_>>>()?;

    let filter = match equals.len() {
        0 => QueryFilter::True,
        1 => equals.remove(0),
        _ => QueryFilter::and(equals),
    };

    let mut request = sort
        .iter()
        .fold(QueryRequest::new(filter), |request, key| request.sort_by(key));
    if let Some(page_size) = page_size {
        request = request.page(page_size, offset);
    }
    Ok(request)
}

/// `field=value`. The value is read as JSON when it parses, as a string otherwise.
fn parse_equals(arg: &str) -> Result<QueryFilter> {
    let Some((field, raw)) = arg.split_once('=') else {
        bail!("Invalid filter '{}', expected FIELD=VALUE", arg);
    };
    if field.trim().is_empty() {
        bail!("Invalid filter '{}', the field name is empty", arg);
    }
    let value = serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok(QueryFilter::equals(field.trim(), value))
}

/// Newline-delimited events read from a file or stdin.
struct EventLines<R> {
    lines: Lines<R>,
    number: usize,
}

impl EventLines<Box<dyn AsyncBufRead + Unpin + Send>> {
    async fn open(file: Option<&Path>) -> Result<Self> {
        let reader: Box<dyn AsyncBufRead + Unpin + Send> = match file {
            Some(path) => Box::new(BufReader::new(
                tokio::fs::File::open(path)
                    .await
                    .with_context(|| format!("Failed to open {}", path.display()))?,
            )),
            None => Box::new(BufReader::new(tokio::io::stdin())),
        };
        Ok(Self::new(reader))
    }
}

impl<R: AsyncBufRead + Unpin> EventLines<R> {
    fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            number: 0,
        }
    }

    /// Next non-blank line with its 1-based line number, parsed as an event.
    async fn next_event(&mut self) -> Result<Option<(usize, Result<Value>)>> {
        while let Some(line) = self.lines.next_line().await.context("Failed to read events")? {
            self.number += 1;
            if !line.trim().is_empty() {
                return Ok(Some((self.number, parse_event(&line))));
            }
        }
        Ok(None)
    }
}

fn parse_event(line: &str) -> Result<Value> {
    let event: Value = serde_json::from_str(line)?;
    if !event.is_object() {
        bail!("event must be a JSON object");
    }
    Ok(event)
}
