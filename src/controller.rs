//! コメント監視セッションのコントローラー
//!
//! `Idle` / `Running` の状態機械。開始時に設定のスナップショットを取り、
//! ログ監視ループをバックグラウンドタスクとして起動する。受け付けた
//! コメントごとに応答生成と読み上げのタスクを起動し、ハンドルを回収する。
//! 停止は協調的で、実行中の応答・読み上げタスクは完了まで走る。

use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::{AppConfig, ConfigManager};
use crate::error::{AivcError, AivcResult};
use crate::reply::{
    is_error_placeholder, CompletionClient, KeywordGate, OpenAiCompletionClient, ReplyError,
    ReplyGenerator,
};
use crate::speech::backends::local::shared_engine;
use crate::speech::{
    AudioOutput, EnabledBackends, EspeakEngine, PlaybackRequest, RodioOutput, SharedSpeechEngine,
    SharedVoiceConversion, SpeechRouter,
};
use crate::transcript::Transcript;
use crate::watcher::{resolve_today_log_file, CommentEvent, LogTail, LogWatcher, WatchItem};

/// 設定からチャット補完クライアントを作る関数
pub type CompletionClientFactory = Arc<
    dyn Fn(&AppConfig) -> Result<Arc<dyn CompletionClient>, ReplyError> + Send + Sync,
>;

/// セッション状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
}

/// `start` の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// 新しいセッションを開始した
    Started { log_file: PathBuf },
    /// 既に実行中のため何もしなかった
    AlreadyRunning,
}

/// 状態の通知とセッションの世代番号
///
/// 世代の採番と状態の書き換えは watch チャネルのロック内で行う。
#[derive(Debug)]
struct SessionStatus {
    sender: watch::Sender<SessionState>,
    current: AtomicU64,
}

impl SessionStatus {
    fn new() -> Self {
        let (sender, _) = watch::channel(SessionState::Idle);
        Self {
            sender,
            current: AtomicU64::new(0),
        }
    }

    /// 新しいセッションの世代を採番して `Running` にする
    fn begin(&self) -> u64 {
        let mut id = 0;
        self.sender.send_modify(|state| {
            id = self.current.fetch_add(1, Ordering::AcqRel) + 1;
            *state = SessionState::Running;
        });
        id
    }

    /// 後続のセッションが始まっていなければ `Idle` に戻す
    fn finish(&self, id: u64) {
        self.sender.send_if_modified(|state| {
            if self.current.load(Ordering::Acquire) != id || *state == SessionState::Idle {
                return false;
            }
            *state = SessionState::Idle;
            true
        });
    }

    fn state(&self) -> SessionState {
        *self.sender.borrow()
    }
}

/// 起動したタスクのハンドルを回収する
#[derive(Debug, Default)]
pub struct TaskTracker {
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskTracker {
    pub fn track(&self, handle: JoinHandle<()>) {
        let mut handles = self.handles.lock();
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }

    /// 未完了のタスク数
    pub fn outstanding(&self) -> usize {
        let mut handles = self.handles.lock();
        handles.retain(|h| !h.is_finished());
        handles.len()
    }

    /// 全タスク（待機中に追加されたものも含む）の完了を待つ
    pub async fn wait_idle(&self) {
        loop {
            let pending: Vec<_> = std::mem::take(&mut *self.handles.lock());
            if pending.is_empty() {
                return;
            }
            for handle in pending {
                if let Err(e) = handle.await {
                    tracing::warn!("⚠️ タスクが異常終了しました: {}", e);
                }
            }
        }
    }
}

/// 1件のコメントから応答・読み上げまでを行う
#[derive(Clone)]
struct ReplyPipeline {
    generator: ReplyGenerator,
    router: SpeechRouter,
    transcript: Transcript,
    character_name: Arc<str>,
    backends: EnabledBackends,
    tasks: Arc<TaskTracker>,
}

impl ReplyPipeline {
    async fn respond(self, event: CommentEvent) {
        let reply = self
            .generator
            .generate_reply(&event.sender_name, &event.comment_text)
            .await;
        self.transcript.reply(&self.character_name, &reply);

        if is_error_placeholder(&reply) || !self.backends.any() {
            return;
        }
        if let Some(request) = PlaybackRequest::new(&reply, self.backends) {
            for handle in self.router.dispatch(&request) {
                self.tasks.track(handle);
            }
        }
    }
}

/// 実行中のセッション
struct ActiveSession {
    id: u64,
    running: Arc<AtomicBool>,
    config: Arc<AppConfig>,
    watch_handle: JoinHandle<()>,
}

impl ActiveSession {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// セッションコントローラー
pub struct Controller {
    transcript: Transcript,
    engine: SharedSpeechEngine,
    voice_conversion: SharedVoiceConversion,
    client_factory: CompletionClientFactory,
    config_manager: Option<ConfigManager>,
    session: tokio::sync::Mutex<Option<ActiveSession>>,
    tasks: Arc<TaskTracker>,
    status: Arc<SessionStatus>,
}

impl Controller {
    /// 既定のバックエンド（OpenAI互換API・espeak-ng・rodio）で作成
    pub fn new(transcript: Transcript) -> Self {
        let client_factory: CompletionClientFactory = Arc::new(|config: &AppConfig| {
            let client: Arc<dyn CompletionClient> =
                Arc::new(OpenAiCompletionClient::from_config(config)?);
            Ok(client)
        });

        Self {
            transcript,
            engine: shared_engine(EspeakEngine::default()),
            voice_conversion: SharedVoiceConversion::new(Arc::new(RodioOutput)),
            client_factory,
            config_manager: None,
            session: tokio::sync::Mutex::new(None),
            tasks: Arc::new(TaskTracker::default()),
            status: Arc::new(SessionStatus::new()),
        }
    }

    pub fn with_completion_factory(mut self, factory: CompletionClientFactory) -> Self {
        self.client_factory = factory;
        self
    }

    pub fn with_speech_engine(mut self, engine: SharedSpeechEngine) -> Self {
        self.engine = engine;
        self
    }

    /// 声質変換の再生先を差し替える（共有バックエンドも作り直す）
    pub fn with_audio_output(mut self, output: Arc<dyn AudioOutput>) -> Self {
        self.voice_conversion = SharedVoiceConversion::new(output);
        self
    }

    /// セッション開始時に設定を保存する
    pub fn with_config_manager(mut self, config_manager: ConfigManager) -> Self {
        self.config_manager = Some(config_manager);
        self
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// 現在の状態
    pub fn state(&self) -> SessionState {
        self.status.state()
    }

    /// 状態表示用の購読
    pub fn subscribe_status(&self) -> watch::Receiver<SessionState> {
        self.status.sender.subscribe()
    }

    /// 実行中セッションの設定スナップショット
    pub async fn session_config(&self) -> Option<Arc<AppConfig>> {
        self.session
            .lock()
            .await
            .as_ref()
            .filter(|s| s.is_running())
            .map(|s| s.config.clone())
    }

    /// 監視を開始する
    ///
    /// 実行中なら何もしない。APIキーがない場合やログファイルを開けない場合は
    /// `Idle` のままエラーを返す。
    pub async fn start(&self, config: AppConfig) -> AivcResult<StartOutcome> {
        let mut slot = self.session.lock().await;
        if slot.as_ref().is_some_and(ActiveSession::is_running) {
            tracing::info!("▶️ 既にコメント取得中です");
            return Ok(StartOutcome::AlreadyRunning);
        }

        if config.api_key().is_none() {
            self.transcript.error("APIキーが未入力です。");
            return Err(AivcError::config("APIキーが未入力です"));
        }

        if let Some(manager) = &self.config_manager {
            if let Err(e) = manager.save_config(&config) {
                self.transcript.warning(format!("設定の保存に失敗: {:#}", e));
            }
        }

        let config = Arc::new(config);
        let client = (self.client_factory)(&config).map_err(|e| {
            self.transcript
                .error(format!("補完クライアントの作成に失敗: {}", e));
            AivcError::from(e)
        })?;

        let log_file = resolve_today_log_file(config.log_folder_path.trim()).map_err(|e| {
            self.transcript.error(format!("ログフォルダが無効です: {}", e));
            AivcError::from(e)
        })?;
        let tail = LogTail::open(&log_file).await.map_err(|e| {
            self.transcript.error(format!("ファイルオープン失敗: {}", e));
            AivcError::from(e)
        })?;

        let file_name = log_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.transcript.status(format!("監視中ファイル: {}", file_name));

        let pipeline = ReplyPipeline {
            generator: ReplyGenerator::from_config(&config, client),
            router: SpeechRouter::from_config(
                &config,
                self.engine.clone(),
                &self.voice_conversion,
                self.transcript.clone(),
            ),
            transcript: self.transcript.clone(),
            character_name: Arc::from(config.character_name.as_str()),
            backends: EnabledBackends::from_config(&config),
            tasks: self.tasks.clone(),
        };

        // 監視タスクの起動より前に Running にする
        let id = self.status.begin();
        let running = Arc::new(AtomicBool::new(true));
        let watcher = LogWatcher::new(tail, running.clone())
            .with_poll_interval(Duration::from_millis(config.poll_interval_ms.max(10)));
        let watch_handle = tokio::spawn(Self::run_session(
            id,
            watcher,
            pipeline,
            KeywordGate::new(config.keywords.as_slice()),
            running.clone(),
            self.status.clone(),
        ));

        *slot = Some(ActiveSession {
            id,
            running,
            config,
            watch_handle,
        });
        tracing::info!(session = id, "▶️ コメント取得を開始しました");
        self.transcript.status("コメント取得中...");

        Ok(StartOutcome::Started { log_file })
    }

    /// ログ監視ループ本体
    async fn run_session(
        id: u64,
        watcher: LogWatcher,
        pipeline: ReplyPipeline,
        gate: KeywordGate,
        running: Arc<AtomicBool>,
        status: Arc<SessionStatus>,
    ) {
        let transcript = pipeline.transcript.clone();
        let tasks = pipeline.tasks.clone();

        let result = watcher
            .run(|item| match item {
                WatchItem::Comment(event) => {
                    pipeline.transcript.comment(event.to_string());
                    if !gate.matches(&event.comment_text) {
                        tracing::debug!(id = %event.id, "🔇 キーワードに一致しないため応答しません");
                        return;
                    }
                    tasks.track(tokio::spawn(pipeline.clone().respond(event)));
                }
                WatchItem::Malformed { error, .. } => {
                    transcript.error(format!("読み取りエラー: {}", error));
                }
            })
            .await;

        if let Err(e) = result {
            transcript.error(format!("ファイル読み取り失敗: {}", e));
            running.store(false, Ordering::Release);
        }

        status.finish(id);
    }

    /// 監視を停止する
    ///
    /// 監視ループは次のポーリング境界で終了する。未完了のタスク数を返す。
    pub async fn stop(&self) -> usize {
        let mut slot = self.session.lock().await;
        if let Some(session) = slot.take() {
            session.running.store(false, Ordering::Release);
            self.tasks.track(session.watch_handle);
            self.status.finish(session.id);
            tracing::info!(session = session.id, "⏹️ コメント取得を停止しました");
            self.transcript.status("コメント取得を停止しました");
        }

        self.tasks.outstanding()
    }

    /// 手動入力のテキストを読み上げる
    ///
    /// ローカルエンジンと声質変換バックエンドはログ監視側と共有される。
    /// ローカルエンジンの呼び出しはエンジンのロックで直列化される。
    pub fn speak(&self, config: &AppConfig, text: &str) -> usize {
        let backends = EnabledBackends::from_config(config);
        let Some(request) = PlaybackRequest::new(text, backends) else {
            return 0;
        };
        if !backends.any() {
            self.transcript.warning("読み上げが有効になっていません");
            return 0;
        }

        let router = SpeechRouter::from_config(
            config,
            self.engine.clone(),
            &self.voice_conversion,
            self.transcript.clone(),
        );
        let handles = router.dispatch(&request);
        let count = handles.len();
        for handle in handles {
            self.tasks.track(handle);
        }
        count
    }

    /// 未完了のタスク数（監視ループ・応答・読み上げ）
    pub fn outstanding_tasks(&self) -> usize {
        self.tasks.outstanding()
    }

    /// 停止済みのループと全タスクの完了を待つ
    pub async fn wait_idle(&self) {
        self.tasks.wait_idle().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reply::CompletionRequest;
    use async_trait::async_trait;

    struct EchoClient;

    #[async_trait]
    impl CompletionClient for EchoClient {
        async fn complete(&self, request: &CompletionRequest) -> Result<String, ReplyError> {
            Ok(format!("re: {}", request.user))
        }

        fn name(&self) -> &'static str {
            "echo"
        }
    }

    fn controller() -> (Controller, tokio::sync::mpsc::UnboundedReceiver<crate::transcript::TranscriptEntry>) {
        let (transcript, rx) = Transcript::new();
        let controller = Controller::new(transcript).with_completion_factory(Arc::new(|_| {
            let client: Arc<dyn CompletionClient> = Arc::new(EchoClient);
            Ok(client)
        }));
        (controller, rx)
    }

    #[test]
    fn test_session_status_begin_and_finish() {
        let status = SessionStatus::new();
        let mut rx = status.sender.subscribe();

        let id = status.begin();
        assert_eq!(status.state(), SessionState::Running);
        status.finish(id);
        assert_eq!(status.state(), SessionState::Idle);
        assert!(rx.has_changed().unwrap());

        // 二重の finish は通知しない
        rx.borrow_and_update();
        status.finish(id);
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_stale_session_does_not_reset_newer_one() {
        let status = SessionStatus::new();
        let first = status.begin();
        let second = status.begin();
        assert_ne!(first, second);

        status.finish(first);
        assert_eq!(status.state(), SessionState::Running);
        status.finish(second);
        assert_eq!(status.state(), SessionState::Idle);
    }

    #[test]
    fn test_finish_right_after_begin_stays_idle() {
        // 監視タスクが即座に失敗した場合の順序
        let status = SessionStatus::new();
        let id = status.begin();
        status.finish(id);
        assert_eq!(status.state(), SessionState::Idle);
        assert_eq!(status.begin(), id + 1);
        assert_eq!(status.state(), SessionState::Running);
    }

    #[tokio::test]
    async fn test_start_without_api_key_stays_idle() {
        let (controller, _rx) = controller();
        let err = controller.start(AppConfig::default()).await.unwrap_err();
        assert!(matches!(err, AivcError::Config(_)));
        assert_eq!(controller.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_start_with_missing_folder_stays_idle() {
        let (controller, _rx) = controller();
        let config = AppConfig {
            api_key: "sk-test".to_string(),
            log_folder_path: "/definitely/not/a/folder".to_string(),
            ..AppConfig::default()
        };
        let err = controller.start(config).await.unwrap_err();
        assert!(matches!(err, AivcError::Watch(_)));
        assert_eq!(controller.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_start_twice_is_noop_and_stop_returns_to_idle() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let (controller, _rx) = controller();
        let config = AppConfig {
            api_key: "sk-test".to_string(),
            log_folder_path: temp_dir.path().to_string_lossy().into_owned(),
            poll_interval_ms: 10,
            ..AppConfig::default()
        };

        let first = controller.start(config.clone()).await.unwrap();
        assert!(matches!(first, StartOutcome::Started { .. }));
        assert_eq!(controller.state(), SessionState::Running);

        let second = controller.start(config).await.unwrap();
        assert_eq!(second, StartOutcome::AlreadyRunning);

        controller.stop().await;
        assert_eq!(controller.state(), SessionState::Idle);
        controller.wait_idle().await;
        assert_eq!(controller.outstanding_tasks(), 0);
        assert!(controller.session_config().await.is_none());
    }

    #[tokio::test]
    async fn test_speak_without_backends_is_noop() {
        let (controller, mut rx) = controller();
        assert_eq!(controller.speak(&AppConfig::default(), "hello"), 0);
        assert_eq!(
            rx.recv().await.unwrap().kind,
            crate::transcript::EntryKind::Warning
        );
    }

    #[tokio::test]
    async fn test_task_tracker_waits_for_nested_tasks() {
        let tracker = Arc::new(TaskTracker::default());
        let inner = tracker.clone();
        tracker.track(tokio::spawn(async move {
            inner.track(tokio::spawn(async {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }));
        }));

        tracker.wait_idle().await;
        assert_eq!(tracker.outstanding(), 0);
    }
}
