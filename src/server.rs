//! `QueryServer` — TCP request/response server over the accumulator and
//! store. Per §4.10/§6: newline-delimited command plus whitespace-separated
//! arguments in, one self-describing record out; one worker thread per
//! accepted connection.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use traffic_core::protocol::{format_live_text, ErrorResponse, TrafficResponse};
use traffic_core::{Accumulator, Store};

pub fn spawn(
    port: u16,
    accumulator: Arc<Accumulator>,
    store: Arc<dyn Store>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<std::thread::JoinHandle<()>> {
    let listener = TcpListener::bind(("0.0.0.0", port))?;
    listener.set_nonblocking(true)?;

    let handle = std::thread::Builder::new()
        .name("query-server".into())
        .spawn(move || {
            while running.load(Ordering::SeqCst) {
                match listener.accept() {
                    Ok((stream, peer)) => {
                        tracing::info!("query connection from {peer}");
                        let accumulator = accumulator.clone();
                        let store = store.clone();
                        let running = running.clone();
                        std::thread::spawn(move || {
                            if let Err(e) = handle_connection(stream, accumulator, store, running) {
                                tracing::warn!("query connection error: {e}");
                            }
                        });
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        std::thread::sleep(std::time::Duration::from_millis(50));
                    }
                    Err(e) => tracing::warn!("accept failed: {e}"),
                }
            }
        })
        .expect("failed to spawn query server thread");

    Ok(handle)
}

fn handle_connection(
    stream: TcpStream,
    accumulator: Arc<Accumulator>,
    store: Arc<dyn Store>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    stream.set_nonblocking(false)?;
    let mut writer = stream.try_clone()?;
    let mut reader = BufReader::new(stream);

    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Ok(());
    }
    let mut parts = line.split_whitespace();
    let command = parts.next().unwrap_or("");
    let args: Vec<&str> = parts.collect();

    match command {
        "snapshot" => {
            let (map, interval) = accumulator.snapshot();
            send_json(&mut writer, &TrafficResponse::new(&map, interval))
        }
        "live" => serve_live(&mut writer, &accumulator, &running, false),
        "live-text" => serve_live(&mut writer, &accumulator, &running, true),
        "traffic-daily" => {
            let start = start_of_today_local();
            let map = store.fetch_since(start)?;
            send_json(&mut writer, &TrafficResponse::new(&map, accumulator.interval_secs()))
        }
        "traffic-since" => match args.first().and_then(|s| s.parse::<i64>().ok()) {
            Some(ts) => {
                let map = store.fetch_since(ts)?;
                send_json(&mut writer, &TrafficResponse::new(&map, accumulator.interval_secs()))
            }
            None => send_json(&mut writer, &ErrorResponse::new("traffic-since requires a unix timestamp")),
        },
        "traffic-between" => match (args.first(), args.get(1)) {
            (Some(a), Some(b)) => match (a.parse::<i64>(), b.parse::<i64>()) {
                (Ok(start), Ok(end)) => {
                    let map = store.fetch_between(start, end)?;
                    send_json(&mut writer, &TrafficResponse::new(&map, accumulator.interval_secs()))
                }
                _ => send_json(&mut writer, &ErrorResponse::new("traffic-between requires two integer timestamps")),
            },
            _ => send_json(&mut writer, &ErrorResponse::new("traffic-between requires start and end timestamps")),
        },
        other => send_json(&mut writer, &ErrorResponse::new(format!("unknown command: {other}"))),
    }
}

fn serve_live(
    writer: &mut TcpStream,
    accumulator: &Arc<Accumulator>,
    running: &Arc<AtomicBool>,
    text: bool,
) -> anyhow::Result<()> {
    if !accumulator.register_observer() {
        let err = ErrorResponse::new("only one live observer is supported at a time");
        return if text {
            writeln!(writer, "{}", err.errmsg).map_err(Into::into)
        } else {
            send_json(writer, &err)
        };
    }

    let result = (|| -> anyhow::Result<()> {
        while running.load(Ordering::SeqCst) {
            let (map, interval) = accumulator.await_delivery();
            if text {
                writer.write_all(format_live_text(&map, interval).as_bytes())?;
            } else {
                send_json(writer, &TrafficResponse::new(&map, interval))?;
            }
        }
        Ok(())
    })();

    accumulator.unregister_observer();
    result
}

fn send_json(writer: &mut TcpStream, value: &impl serde::Serialize) -> anyhow::Result<()> {
    let mut line = serde_json::to_string(value)?;
    line.push('\n');
    writer.write_all(line.as_bytes())?;
    Ok(())
}

fn start_of_today_local() -> i64 {
    let now = chrono::Local::now();
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        .and_local_timezone(chrono::Local)
        .single()
        .unwrap_or(now)
        .timestamp()
}
