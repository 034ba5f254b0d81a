use anyhow::Result;
use std::fmt::Write;

use crate::config::Config;
use crate::core::Core;
use crate::pool::PoolStats;

/// Print every configured backend
pub fn cmd_check(config: &Config) -> Result<()> {
    print!("{}", render_backends(config)?);
    Ok(())
}

/// Backend table for `check`. Credentials are never rendered.
fn render_backends(config: &Config) -> Result<String> {
    let backends = config.backends();
    let mut out = String::new();

    writeln!(
        out,
        "{:<16} {:<28} {:>8} {:>9} {:>8}",
        "BACKEND", "ADDRESS", "INITIAL", "CAPACITY", "TIMEOUT"
    )?;
    for (name, backend) in &backends {
        writeln!(
            out,
            "{:<16} {:<28} {:>8} {:>9} {:>7}s",
            name, backend.address, backend.initial, backend.capacity, backend.connect_timeout_secs
        )?;
    }

    writeln!(out)?;
    writeln!(out, "{} backend(s) configured", backends.len())?;
    Ok(out)
}

/// Exercise each backend through its lifecycle component and report the result
pub async fn cmd_probe(core: &Core, acquire: usize, services: &[String]) -> Result<()> {
    let mut failures = 0usize;

    if let Some(pool) = core.document_pool() {
        let mut leases = Vec::with_capacity(acquire);
        for _ in 0..acquire {
            match pool.acquire().await {
                Ok(lease) => leases.push(lease),
                Err(e) => {
                    println!("documents: {}", e);
                    failures += 1;
                    break;
                }
            }
        }

        print_stats("documents", &pool.stats().await);
        for lease in leases {
            pool.release(lease);
        }
    }

    if let Some(handle) = core.database_handle() {
        match core.database().await {
            Ok(conn) => println!(
                "database: connected to {} (connection #{}, generation {})",
                conn.peer_addr(),
                conn.id(),
                handle.generation()
            ),
            Err(e) => {
                println!("database: {}", e);
                failures += 1;
            }
        }
    }

    if core.config.cache.is_some() {
        match core.cache().await {
            Ok(conn) => println!("cache: connected to {} (connection #{})", conn.peer_addr(), conn.id()),
            Err(e) => {
                println!("cache: {}", e);
                failures += 1;
            }
        }
    }

    let names = if services.is_empty() {
        let mut names: Vec<String> = core.config.services.keys().cloned().collect();
        names.sort();
        names
    } else {
        services.to_vec()
    };

    for name in &names {
        let pool = match core.service(name).await {
            Ok(pool) => pool,
            Err(e) => {
                println!("{}: {}", name, e);
                failures += 1;
                continue;
            }
        };

        match pool.acquire().await {
            Ok(lease) => pool.release(lease),
            Err(e) => {
                println!("{}: {}", name, e);
                failures += 1;
            }
        }
        print_stats(name, &pool.stats().await);
    }

    if failures > 0 {
        anyhow::bail!("{} backend check(s) failed", failures);
    }

    Ok(())
}

fn print_stats(name: &str, stats: &PoolStats) {
    println!(
        "{}: size {}/{} (busy {}, idle {}), created {}, acquired {}, exhausted {}, failed {}",
        name,
        stats.size,
        stats.capacity,
        stats.busy,
        stats.idle,
        stats.total_created,
        stats.total_acquired,
        stats.total_exhausted,
        stats.failed_attempts
    );
}
