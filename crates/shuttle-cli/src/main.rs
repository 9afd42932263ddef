use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use serde_json::{Value, json};
use tracing::{error, info};

use shuttle_core::app::{EngineBuilder, EngineConfig};
use shuttle_core::impls::SysinfoReaper;
use shuttle_core::observability::{LoggerConfig, LoggerFormat, logger_init};
use shuttle_core::ports::{CloseHandler, CloseHook};
use shuttle_core::typed::{CallArgs, Callable, CyclicTask, Param, Signature};

/// ホスト側ウィンドウの代わり（close ハンドラを 1 つ持つだけ）
#[derive(Default)]
struct DemoWindow {
    on_close: Option<CloseHandler>,
}

impl CloseHook for DemoWindow {
    fn take_close_handler(&mut self) -> Option<CloseHandler> {
        self.on_close.take()
    }

    fn set_close_handler(&mut self, handler: CloseHandler) {
        self.on_close = Some(handler);
    }
}

impl DemoWindow {
    fn close(&mut self) {
        if let Some(handler) = self.on_close.take() {
            handler();
        }
    }
}

fn read_file_task() -> Result<CyclicTask, shuttle_core::ShuttleError> {
    let signature = Signature::new([Param::required("path"), Param::optional("max_bytes", 200)])?;
    let read = Callable::new(signature, |args| {
        let path = args.named("path").and_then(Value::as_str).unwrap_or_default();
        let max = args
            .named("max_bytes")
            .and_then(Value::as_u64)
            .unwrap_or(200) as usize;
        match std::fs::read_to_string(path) {
            Ok(text) => json!([path, text.chars().take(max).collect::<String>()]),
            Err(e) => json!([path, Value::Null, e.to_string()]),
        }
    });
    Ok(CyclicTask::once(read))
}

fn ticker_task() -> CyclicTask {
    let n = Arc::new(AtomicU32::new(0));
    CyclicTask::unbounded(Callable::nullary(move || {
        std::thread::sleep(Duration::from_millis(100));
        json!(n.fetch_add(1, Ordering::SeqCst))
    }))
}

#[tokio::main]
async fn main() {
    let format = std::env::var("SHUTTLE_LOG_FORMAT")
        .ok()
        .and_then(|s| s.parse::<LoggerFormat>().ok())
        .unwrap_or(LoggerFormat::Text);
    let level = std::env::var("SHUTTLE_LOG").unwrap_or_else(|_| "info".to_string());
    if let Err(e) = logger_init(&LoggerConfig {
        format,
        level,
        ..LoggerConfig::default()
    }) {
        eprintln!("logger: {e}");
    }

    if let Err(e) = run().await {
        error!(target: "shuttle.cli", %e, "demo failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args().nth(1).unwrap_or_else(|| "Cargo.toml".to_string());

    // (A) エンジンを構築（結果は HostQueue 経由でこのスレッドに届く）
    let config = EngineConfig::default()
        .with_poll_interval(20)
        .with_reap_task_processes(true);
    let (engine, mut queue) = EngineBuilder::new()
        .config(config)
        .reaper(Arc::new(SysinfoReaper::new()))
        .build_with_queue()?;
    let (controller, renderer) = engine.into_parts();

    let mut window = DemoWindow::default();
    window.set_close_handler(Box::new(|| info!(target: "shuttle.cli", "window closed")));
    controller.bind_close(&mut window);

    // (B) タスク登録とリスナー
    controller.register("read_file", read_file_task()?)?;
    controller.register("ticker", ticker_task())?;

    renderer.once("read_file", |payload: &[Value]| {
        println!("read_file -> {}", Value::from(payload.to_vec()));
    });
    renderer.on("ticker", |payload: &[Value]| {
        println!("tick {}", payload.first().unwrap_or(&Value::Null));
    });

    // (C) start（引数は宣言済みの Signature に対して検証される）
    controller.start("read_file", CallArgs::new().arg(path).kwarg("max_bytes", 80))?;
    controller.start("ticker", CallArgs::new())?;

    // (D) ホストのイベントループ代わり：tick を 5 回受けたら cancel
    let mut ticks = 0;
    while ticks < 5 {
        let Some(result) = queue.dispatch_next(&renderer).await else {
            break;
        };
        if result.name().as_str() == "ticker" {
            ticks += 1;
        }
    }
    controller.cancel("ticker")?;
    info!(target: "shuttle.cli", counts = ?controller.counts(), "ticker cancelled");

    for snapshot in controller.snapshots() {
        println!("{}", serde_json::to_string(&snapshot)?);
    }

    // (E) close → shutdown → 元の close ハンドラ
    tokio::task::spawn_blocking(move || window.close()).await?;
    queue.dispatch_pending(&renderer);
    Ok(())
}
