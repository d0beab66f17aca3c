//! Watch mode - 파일 변경 시 플러그인 핫 리로드와 설정 재적용
//!
//! - `<config-dir>/plugins/<name>.plugin` 변경: 해당 플러그인 리로드
//! - `<config-dir>/plugins.json` 변경: 플러그인 설정 재로드 후 전달

use crate::demo;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use weave_core::{FnSource, HotReloadManager, PluginManager, PollingWatcher};
use weave_foundation::{Error, PLUGINS_CONFIG_FILE};

/// 설정 파일 감시에 쓰는 이름
const CONFIG_WATCH_KEY: &str = "plugins.json";

/// Ctrl-C까지 감시
pub async fn run(manager: Arc<PluginManager>, config_dir: &Path) -> anyhow::Result<()> {
    let hot_reload = manager.runtime().config().hot_reload.clone();
    let reloader = HotReloadManager::new(manager.clone());

    for (name, _) in manager.plugins() {
        let file = config_dir.join("plugins").join(format!("{name}.plugin"));
        let factory_name = name.clone();
        let source = FnSource::new(move || {
            demo::create(&factory_name).ok_or_else(|| Error::PluginNotFound(factory_name.clone()))
        });
        reloader.watch(name, Arc::new(source), vec![file]);
    }
    let plugin_watcher =
        PollingWatcher::new(hot_reload.poll_interval()).with_targets(reloader.watched_files());

    let (change_tx, change_rx) = mpsc::channel(64);
    let watcher_task = plugin_watcher.spawn(change_tx);
    let reload_task = reloader.spawn(change_rx);

    let mut config_watcher = PollingWatcher::new(hot_reload.poll_interval());
    config_watcher.watch(CONFIG_WATCH_KEY, config_dir.join(PLUGINS_CONFIG_FILE));
    let (config_tx, mut config_rx) = mpsc::channel(8);
    let config_task = config_watcher.spawn(config_tx);

    info!(
        files = reloader.watched_files().len(),
        enabled = hot_reload.enabled,
        "Watching for changes, press Ctrl-C to stop"
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Some(_) = config_rx.recv() => {
                match manager.reload_config_file().await {
                    Ok(changed) => info!(?changed, "Plugin config reloaded"),
                    Err(e) => warn!(error = %e, "Plugin config reload failed"),
                }
            }
        }
    }

    watcher_task.abort();
    reload_task.abort();
    config_task.abort();

    for report in reloader.reports() {
        println!("{}", serde_json::to_string(&report)?);
    }
    Ok(())
}
