//! UDP PUT 클라이언트 (송신자)
//!
//! 파일들을 세그먼트로 나눠 서버에 전송하고, 서버가 돌려준 CRC32C로 검증한다.
//! 파일 ID는 인자 순서(0부터).
//!
//! 사용법:
//!   cargo run --release --bin udp-put-client -- --port 9000 [OPTIONS] FILES...
//!
//! 예시:
//!   # 두 파일 전송
//!   cargo run --release --bin udp-put-client -- --host 10.0.0.2 --port 9000 a.bin b.bin
//!
//!   # 손실이 많은 네트워크
//!   cargo run --release --bin udp-put-client -- --rounds 64 --speed-limit 2097152 a.bin

use std::net::SocketAddr;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use udp_put::{Config, FileSender, DEFAULT_PORT, MAX_PAYLOAD_SIZE};

/// UDP PUT 송신 클라이언트
#[derive(Parser)]
#[command(name = "udp-put-client")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// 서버 호스트
    #[arg(long, default_value = "localhost")]
    host: String,

    /// 서버 포트
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// ACK 대기 타임아웃 (밀리초)
    #[arg(long, default_value_t = 1000)]
    ack_timeout_ms: u64,

    /// 최대 송신 라운드 수
    #[arg(long, default_value_t = 16)]
    rounds: u32,

    /// 송신 속도 한도 (bytes/sec, 0 = 무제한)
    #[arg(long, default_value_t = 10 * 1024 * 1024)]
    speed_limit: u32,

    /// 세그먼트 크기 (바이트)
    #[arg(long, default_value_t = MAX_PAYLOAD_SIZE)]
    segment_size: usize,

    /// 디버그 로그 출력
    #[arg(short, long)]
    verbose: bool,

    /// 전송할 파일들
    #[arg(required = true)]
    files: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = Config {
        ack_timeout_ms: cli.ack_timeout_ms,
        max_send_rounds: cli.rounds,
        speed_limit: cli.speed_limit,
        segment_size: cli.segment_size,
        ..Config::default()
    };

    let server_addr = tokio::net::lookup_host((cli.host.as_str(), cli.port))
        .await?
        .next()
        .ok_or_else(|| format!("주소를 찾을 수 없음: {}:{}", cli.host, cli.port))?;

    let bind_addr: SocketAddr = if server_addr.is_ipv4() {
        "0.0.0.0:0".parse()?
    } else {
        "[::]:0".parse()?
    };

    info!("Connecting to server {}...", server_addr);
    let sender = FileSender::connect(bind_addr, server_addr, config).await?;

    let mut failures = 0;
    for (file_id, path) in cli.files.iter().enumerate() {
        match sender.send_path(file_id as u64, path).await {
            Ok(report) => {
                info!(
                    "[{}] {}: OK, {} bytes, {} segments, crc32c={:08X}, {:.2}s ({:.2} MB/s)",
                    file_id,
                    path,
                    report.bytes,
                    report.segments,
                    report.checksum,
                    report.elapsed.as_secs_f64(),
                    report.throughput() / 1_000_000.0
                );
            }
            Err(e) => {
                error!("[{}] {}: FAILED, {}", file_id, path, e);
                failures += 1;
            }
        }
    }

    info!(
        "{}/{} files verified",
        cli.files.len() - failures,
        cli.files.len()
    );

    Ok(if failures == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
