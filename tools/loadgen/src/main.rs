// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Stands up a `sum` service on a private in-process broker, hammers it through the client,
//! and checks every answer.

mod args;
mod config;

use crate::args::Args;
use crate::config::LoadConfig;
use clap::Parser;
use eyre::eyre;
use futures_util::StreamExt;
use futures_util::stream;
use porthos_broker::{Broker, VirtualHost};
use porthos_client::{Client, ClientOptions};
use porthos_server::{HandlerResult, Request, Response, Server, StatusCode};
use std::sync::Arc;
use std::time::Instant;
use tokio::select;
use tracing::{error, info, warn};
use uuid::Uuid;

async fn sum(request: Request, mut response: Response) -> HandlerResult {
    let total = request
        .form()?
        .iter()
        .map(|arg| arg.as_f64())
        .sum::<Result<f64, _>>()?;
    response.json(StatusCode::OK, &total)?;
    Ok(response)
}

#[derive(Debug, Default)]
struct Tally {
    ok: usize,
    wrong: usize,
    failed: usize,
}

async fn run(config: LoadConfig) -> Result<Tally, eyre::Report> {
    let vhost = VirtualHost::bind(&format!("loadgen-{}", Uuid::new_v4()))?;
    let broker = Broker::connect(&vhost.url())?;

    let server = Arc::new(Server::new(&broker, &config.service, config.server.clone()).await?);
    server.register("sum", sum)?;
    let serving = {
        let server = server.clone();
        tokio::spawn(async move { server.listen_and_serve().await })
    };

    let client = Client::new(
        &broker,
        &config.service,
        ClientOptions {
            timeout: config.call_timeout,
        },
    )
    .await?;

    let started = Instant::now();
    let tally = stream::iter(0..config.requests)
        .map(|i| {
            let client = &client;
            async move {
                let n = i as f64;
                let reply = client.call("sum", &[n, n + 1.0, n + 2.0]).await;
                (i, 3.0 * n + 3.0, reply)
            }
        })
        .buffer_unordered(config.concurrency)
        .fold(Tally::default(), |mut tally, (i, expected, reply)| async move {
            match reply.and_then(|r| r.json::<f64>()) {
                Ok(total) if total == expected => tally.ok += 1,
                Ok(total) => {
                    warn!(request = i, expected, total, "wrong answer");
                    tally.wrong += 1;
                }
                Err(e) => {
                    warn!(request = i, error = %e, "call failed");
                    tally.failed += 1;
                }
            }
            tally
        })
        .await;
    let elapsed = started.elapsed();

    client.close();
    server.close().await;
    if let Err(e) = serving.await? {
        error!(error = %e, "server stopped abnormally");
    }

    let rate = tally.ok as f64 / elapsed.as_secs_f64().max(f64::EPSILON);
    info!(
        service = %config.service,
        ok = tally.ok,
        wrong = tally.wrong,
        failed = tally.failed,
        elapsed = %humantime::format_duration(elapsed),
        rate = %format!("{rate:.0}/s"),
        "load run complete"
    );
    Ok(tally)
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), eyre::Report> {
    color_eyre::install()?;
    let args: Args = Args::parse();
    porthos_common::tracing::init_tracing(args.debug)?;

    let config = args.load_config()?;
    info!(?config, "starting load run");

    let tally = select! {
        tally = run(config) => tally?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received interrupt, stopping");
            return Ok(());
        }
    };
    if tally.wrong + tally.failed > 0 {
        return Err(eyre!(
            "{} of {} calls did not get the right answer",
            tally.wrong + tally.failed,
            tally.ok + tally.wrong + tally.failed
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_small_run_is_all_correct() {
        let config = LoadConfig {
            requests: 50,
            concurrency: 8,
            ..Default::default()
        };
        let tally = run(config).await.unwrap();
        assert_eq!((tally.ok, tally.wrong, tally.failed), (50, 0, 0));
    }

    #[tokio::test]
    async fn test_sum_rejects_non_numbers() {
        let response = sum(Request::new("sum", r#"[1, "x"]"#), Response::new()).await;
        assert!(response.is_err());
        let response = sum(Request::new("sum", "[1, 2.5]"), Response::new())
            .await
            .unwrap();
        assert_eq!(response.body().map(|b| b.as_ref()), Some(&b"3.5"[..]));
    }
}
