use std::env;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use zeta_cctx_tracker::bitcoin::MinerHandle;
use zeta_cctx_tracker::cctx::wait_for_fee_bump;
use zeta_cctx_tracker::monitor::{MonitorTask, StressSummary};
use zeta_cctx_tracker::{expect_status, CctxStatus, Config, LookupKey, TrackerContext};

fn build_cli() -> Command {
    Command::new("cctx-tracker")
        .version(env!("CARGO_PKG_VERSION"))
        .about("🔭 ZetaChain CCTX 확인 추적 및 동시 모니터링 도구")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("설정 파일 경로")
                .default_value("config/default.toml")
                .global(true),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("로그 레벨 (trace, debug, info, warn, error)")
                .default_value("info")
                .global(true),
        )
        .subcommand(
            Command::new("wait")
                .about("CCTX가 최종 상태에 도달할 때까지 대기")
                .arg(Arg::new("hash").long("hash").value_name("INBOUND_HASH").conflicts_with("index"))
                .arg(Arg::new("index").long("index").value_name("CCTX_INDEX"))
                .arg(timeout_arg())
                .arg(expect_arg()),
        )
        .subcommand(
            Command::new("chain")
                .about("연쇄 CCTX를 순서대로 대기")
                .arg(Arg::new("hash").long("hash").value_name("INBOUND_HASH").required(true))
                .arg(
                    Arg::new("hops")
                        .long("hops")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("2"),
                )
                .arg(timeout_arg())
                .arg(expect_arg()),
        )
        .subcommand(
            Command::new("tracker")
                .about("outbound tracker 해시 대기 (선택: 수수료 대체 검증)")
                .arg(
                    Arg::new("chain-id")
                        .long("chain-id")
                        .value_parser(clap::value_parser!(i64))
                        .required(true),
                )
                .arg(
                    Arg::new("nonce")
                        .long("nonce")
                        .value_parser(clap::value_parser!(u64))
                        .required(true),
                )
                .arg(
                    Arg::new("min-count")
                        .long("min-count")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("1"),
                )
                .arg(
                    Arg::new("replacement")
                        .long("replacement")
                        .help("hash[0] 드롭, hash[1] 채굴 및 수수료율 증가 확인")
                        .action(ArgAction::SetTrue),
                )
                .arg(timeout_arg()),
        )
        .subcommand(
            Command::new("stress")
                .about("파일의 인바운드 해시들을 동시에 모니터링")
                .arg(Arg::new("file").long("file").value_name("FILE").required(true))
                .arg(
                    Arg::new("hops")
                        .long("hops")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("1"),
                )
                .arg(timeout_arg())
                .arg(expect_arg()),
        )
        .subcommand(
            Command::new("blocks")
                .about("EVM 블록 높이 대기")
                .arg(
                    Arg::new("count")
                        .long("count")
                        .value_parser(clap::value_parser!(u64))
                        .conflicts_with("height"),
                )
                .arg(
                    Arg::new("height")
                        .long("height")
                        .value_parser(clap::value_parser!(u64)),
                )
                .arg(timeout_arg()),
        )
        .subcommand(
            Command::new("trace")
                .about("EVM 트랜잭션 영수증과 호출 트레이스 조회")
                .arg(Arg::new("tx").long("tx").value_name("TX_HASH").required(true)),
        )
}

fn timeout_arg() -> Arg {
    Arg::new("timeout")
        .long("timeout")
        .value_name("SECONDS")
        .help("대기 타임아웃 (기본값: 설정 파일)")
        .value_parser(clap::value_parser!(u64))
}

fn expect_arg() -> Arg {
    Arg::new("expect")
        .long("expect")
        .value_name("STATUS")
        .help("기대 최종 상태 (예: OutboundMined)")
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = build_cli().get_matches();

    // 로그 레벨 설정
    let log_level = matches
        .get_one::<String>("log-level")
        .map(String::as_str)
        .unwrap_or("info");

    // 로깅 초기화
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter(log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if dotenvy::dotenv().is_ok() {
        info!("📄 .env 파일 로드됨");
    }

    // 설정 파일 로드
    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("config/default.toml");
    info!("📋 설정 파일 로드 중: {}", config_path);

    let mut config = Config::load(config_path).context("설정 로드 실패")?;

    // 환경 변수에서 엔드포인트 로드
    load_environment_variables(&mut config);

    // 설정 검증
    if let Err(e) = config.validate() {
        error!("❌ 설정 검증 실패: {}", e);
        std::process::exit(1);
    }
    info!("✅ 설정 로드 완료");

    let ctx = TrackerContext::from_config(&config).context("클라이언트 초기화 실패")?;

    // 신호 처리 설정
    let cancel = ctx.cancel.clone();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                warn!("🛑 종료 신호 수신됨, 대기 중인 작업 취소...");
                cancel.cancel();
            }
            Err(err) => error!("❌ 신호 처리 오류: {}", err),
        }
    });

    match matches.subcommand() {
        Some(("wait", sub)) => run_wait(&ctx, &config, sub).await,
        Some(("chain", sub)) => run_chain(&ctx, &config, sub).await,
        Some(("tracker", sub)) => run_tracker(&ctx, &config, sub).await,
        Some(("stress", sub)) => run_stress(&ctx, &config, sub).await,
        Some(("blocks", sub)) => run_blocks(&ctx, &config, sub).await,
        Some(("trace", sub)) => run_trace(&ctx, sub).await,
        _ => Err(anyhow!("알 수 없는 명령")),
    }
}

fn log_filter(level: &str) -> &'static str {
    match level {
        "trace" => "trace",
        "debug" => "debug",
        "info" => "info",
        "warn" => "warn",
        "error" => "error",
        _ => "info",
    }
}

fn load_environment_variables(config: &mut Config) {
    if let Ok(url) = env::var("ZETACORE_REST_URL") {
        config.zetacore.rest_url = url;
        info!("🌐 zetacore REST URL loaded from environment");
    }

    if let Ok(url) = env::var("EVM_RPC_URL") {
        config.evm_rpc.url = Some(url);
        info!("🌐 EVM RPC URL loaded from environment");
    }

    if let Ok(url) = env::var("BTC_RPC_URL") {
        config.bitcoin.rpc_url = Some(url);
        info!("🌐 Bitcoin RPC URL loaded from environment");
    }

    if let Ok(user) = env::var("BTC_RPC_USER") {
        config.bitcoin.rpc_user = Some(user);
    }

    if let Ok(password) = env::var("BTC_RPC_PASSWORD") {
        config.bitcoin.rpc_password = Some(password);
        info!("🔑 Bitcoin RPC credentials loaded from environment");
    }
}

fn timeout_of(sub: &ArgMatches, config: &Config) -> Duration {
    sub.get_one::<u64>("timeout")
        .map(|secs| Duration::from_secs(*secs))
        .unwrap_or_else(|| Duration::from_secs(config.polling.cctx_timeout_secs))
}

fn expected_of(sub: &ArgMatches) -> Result<Option<CctxStatus>> {
    sub.get_one::<String>("expect")
        .map(|s| s.parse::<CctxStatus>())
        .transpose()
        .map_err(|e| anyhow!("{}", e))
}

/// Mine regtest blocks while waiting, when a local Bitcoin node is configured
fn start_local_miner(ctx: &TrackerContext, config: &Config) -> Option<MinerHandle> {
    if !config.bitcoin.regtest {
        return None;
    }
    let address = config.bitcoin.mining_address.as_deref()?;
    match ctx.start_miner(address, Duration::from_millis(config.bitcoin.mining_interval_ms)) {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("⚠️ 블록 채굴을 시작하지 못함: {}", e);
            None
        }
    }
}

async fn stop_miner(miner: Option<MinerHandle>) {
    if let Some(miner) = miner {
        miner.stop().await;
    }
}

async fn run_wait(ctx: &TrackerContext, config: &Config, sub: &ArgMatches) -> Result<()> {
    let key = match (sub.get_one::<String>("hash"), sub.get_one::<String>("index")) {
        (Some(hash), _) => LookupKey::InboundHash(hash.clone()),
        (None, Some(index)) => LookupKey::Index(index.clone()),
        (None, None) => return Err(anyhow!("--hash 또는 --index 중 하나가 필요합니다")),
    };
    let expected = expected_of(sub)?;

    let miner = start_local_miner(ctx, config);
    let result = ctx.poller().wait_for_terminal(&key, timeout_of(sub, config)).await;
    stop_miner(miner).await;

    let cctx = result.with_context(|| format!("{} 대기 실패", key))?;
    println!("{}", serde_json::to_string_pretty(&cctx)?);

    if let Some(expected) = expected {
        expect_status(&cctx, expected)?;
    }
    match cctx.last_update() {
        Ok(at) => info!("✅ cctx {} 최종 상태: {} ({})", cctx.index, cctx.status(), at.to_rfc3339()),
        Err(_) => info!("✅ cctx {} 최종 상태: {}", cctx.index, cctx.status()),
    }
    Ok(())
}

async fn run_chain(ctx: &TrackerContext, config: &Config, sub: &ArgMatches) -> Result<()> {
    let hash = sub
        .get_one::<String>("hash")
        .ok_or_else(|| anyhow!("--hash가 필요합니다"))?;
    let hops = sub.get_one::<usize>("hops").copied().unwrap_or(2);
    let expected = expected_of(sub)?;

    let chain = ctx
        .resolver()
        .wait_for_chain(hash, hops, timeout_of(sub, config))
        .await?;

    for (i, cctx) in chain.iter().enumerate() {
        println!("hop {}/{}: {} {}", i + 1, hops, cctx.index, cctx.status());
    }
    if let (Some(expected), Some(last)) = (expected, chain.last()) {
        expect_status(last, expected)?;
    }
    Ok(())
}

async fn run_tracker(ctx: &TrackerContext, config: &Config, sub: &ArgMatches) -> Result<()> {
    let chain_id = *sub
        .get_one::<i64>("chain-id")
        .ok_or_else(|| anyhow!("--chain-id가 필요합니다"))?;
    let nonce = *sub
        .get_one::<u64>("nonce")
        .ok_or_else(|| anyhow!("--nonce가 필요합니다"))?;
    let replacement = sub.get_flag("replacement");
    let min_count = sub.get_one::<usize>("min-count").copied().unwrap_or(1);
    let timeout = timeout_of(sub, config);

    let miner = start_local_miner(ctx, config);
    let result = async {
        if replacement {
            // the first broadcast must be priced before it is evicted by the bump
            let (original, bumped) = wait_for_fee_bump(
                &ctx.tracker_watcher(),
                &ctx.fee_replacement_watcher()?,
                chain_id,
                nonce,
                timeout,
            )
            .await?;
            println!(
                "replaced: {} ({} sat/vB, {:?}) -> {} ({} sat/vB, {:?})",
                original.hash, original.fee_rate, original.state, bumped.hash, bumped.fee_rate, bumped.state
            );
            return Ok(());
        }

        let hashes = ctx
            .tracker_watcher()
            .wait_for_tracker_hashes(chain_id, nonce, min_count, timeout)
            .await?;
        for (i, hash) in hashes.iter().enumerate() {
            println!("hash[{}]: {}", i, hash);
        }
        Ok::<(), zeta_cctx_tracker::TrackerError>(())
    }
    .await;
    stop_miner(miner).await;

    result.with_context(|| format!("outbound tracker {}/{} 대기 실패", chain_id, nonce))
}

/// One inbound hash per line; blank lines and `#` comments are skipped
fn read_hashes(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

async fn run_stress(ctx: &TrackerContext, config: &Config, sub: &ArgMatches) -> Result<()> {
    let path = sub
        .get_one::<String>("file")
        .ok_or_else(|| anyhow!("--file이 필요합니다"))?;
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("{} 읽기 실패", path))?;
    let hashes = read_hashes(&content);
    if hashes.is_empty() {
        return Err(anyhow!("{}에 인바운드 해시가 없습니다", path));
    }

    let hops = sub.get_one::<usize>("hops").copied().unwrap_or(1);
    let expected = expected_of(sub)?;
    let timeout = timeout_of(sub, config);

    let tasks: Vec<MonitorTask> = hashes
        .iter()
        .enumerate()
        .map(|(i, hash)| {
            let task = if hops > 1 {
                MonitorTask::chain(i, hash, hops)
            } else {
                MonitorTask::terminal(i, LookupKey::InboundHash(hash.clone()))
            };
            let task = task.with_timeout(timeout);
            match expected {
                Some(status) => task.expect(status),
                None => task,
            }
        })
        .collect();

    info!("📊 스트레스 모니터링: {}개 인바운드 해시", tasks.len());
    let report = ctx.pool().run_collect(tasks).await;
    let summary = StressSummary::from_report(&report, &config.monitor.percentiles);
    println!("{}", summary);

    if !summary.is_success() {
        return Err(anyhow!("{}개 CCTX 실패", summary.failed));
    }
    Ok(())
}

async fn run_blocks(ctx: &TrackerContext, config: &Config, sub: &ArgMatches) -> Result<()> {
    let waiter = ctx.block_waiter()?;
    let timeout = timeout_of(sub, config);

    let height = match (sub.get_one::<u64>("count"), sub.get_one::<u64>("height")) {
        (Some(count), _) => waiter.wait_for_blocks(*count, timeout).await?,
        (None, Some(height)) => waiter.wait_for_height(*height, timeout).await?,
        (None, None) => return Err(anyhow!("--count 또는 --height 중 하나가 필요합니다")),
    };
    println!("block height: {}", height);
    Ok(())
}

async fn run_trace(ctx: &TrackerContext, sub: &ArgMatches) -> Result<()> {
    let tx = sub
        .get_one::<String>("tx")
        .ok_or_else(|| anyhow!("--tx가 필요합니다"))?;
    let rpc = ctx.evm_rpc()?;

    let receipt = rpc
        .get_transaction_receipt(tx)
        .await?
        .ok_or_else(|| anyhow!("트랜잭션 {}의 영수증이 없습니다 (pending 또는 미존재)", tx))?;
    println!(
        "tx {}: block {}, status {}, gas used {}",
        receipt.transaction_hash,
        receipt.block_number,
        match receipt.succeeded() {
            Some(true) => "success",
            Some(false) => "reverted",
            None => "unknown",
        },
        receipt.gas_used
    );

    let frame = rpc.trace_transaction(tx).await?;
    println!("call depth: {}", frame.depth());
    for (depth, call) in frame.walk() {
        println!(
            "{}{} {} -> {}{}",
            "  ".repeat(depth),
            call.call_type,
            call.from,
            call.to.as_deref().unwrap_or("-"),
            call.error.as_ref().map(|e| format!(" ❌ {}", e)).unwrap_or_default()
        );
    }
    if let Some(failed) = frame.first_error() {
        warn!(
            "⚠️ 첫 번째 실패 호출: {} -> {} ({})",
            failed.from,
            failed.to.as_deref().unwrap_or("-"),
            failed.revert_reason.as_deref().or(failed.error.as_deref()).unwrap_or("-")
        );
    }
    Ok(())
}
