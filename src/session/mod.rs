//! Session orchestration
//!
//! A [`Session`] owns the observable state of one workspace: the include and
//! exclude pattern texts (persisted), the selected files, their metadata and
//! the current chat. Changing a pattern text recomputes the file list, and a
//! new file list recomputes the metadata. Failures are reported through the
//! [`Notifier`] and never end the session.

use crate::config::Config;
use crate::context::{build_prompt, FileMeta, FileReader, FileRef, FileSearch, FileSelector, FileSummarizer};
use crate::llm::{Chat, ChatAnswer, ChatProviderFactory};
use crate::state::{
    ApiKeyResolver, KeyValueStore, Observable, PersistentObservable, Subscription, FILES_TO_EXCLUDE_KEY,
    FILES_TO_INCLUDE_KEY,
};
use crate::ui::{Inbound, Notifier, Outbound};
use crate::Result;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Everything a session needs from the outside world
pub struct SessionDeps {
    pub root: PathBuf,
    pub config: Config,
    pub store: Arc<dyn KeyValueStore>,
    pub keys: ApiKeyResolver,
    pub search: Arc<dyn FileSearch>,
    pub reader: Arc<dyn FileReader>,
    pub providers: Arc<dyn ChatProviderFactory>,
    pub notifier: Arc<dyn Notifier>,
}

/// Monotonic ticket source; only the newest ticket may publish its result
#[derive(Debug, Default)]
struct Generation(AtomicU64);

impl Generation {
    fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_current(&self, ticket: u64) -> bool {
        self.0.load(Ordering::SeqCst) == ticket
    }
}

/// Subscriptions created by [`Session::subscribe_outbound`]
#[must_use = "dropping the handles leaves the subscriptions active"]
pub struct OutboundSubscriptions {
    files: Subscription,
    metas: Subscription,
    chat: Subscription,
}

pub struct Session {
    root: PathBuf,
    include_text: PersistentObservable<String>,
    exclude_text: PersistentObservable<String>,
    files: Observable<Arc<Vec<FileRef>>>,
    metas: Observable<Arc<Vec<FileMeta>>>,
    chat: Observable<Option<Arc<Chat>>>,
    selector: FileSelector,
    summarizer: FileSummarizer,
    keys: ApiKeyResolver,
    providers: Arc<dyn ChatProviderFactory>,
    notifier: Arc<dyn Notifier>,
    files_generation: Generation,
    chat_generation: Generation,
}

impl Session {
    pub fn new(deps: SessionDeps) -> Self {
        let SessionDeps {
            root,
            config,
            store,
            keys,
            search,
            reader,
            providers,
            notifier,
        } = deps;

        let include_text = PersistentObservable::new(Arc::clone(&store), FILES_TO_INCLUDE_KEY, String::new());
        let exclude_text = PersistentObservable::new(store, FILES_TO_EXCLUDE_KEY, String::new());

        Self {
            selector: FileSelector::new(root.clone(), search).with_max_results(config.max_results),
            summarizer: FileSummarizer::new(reader).with_concurrency(config.read_concurrency),
            root,
            include_text,
            exclude_text,
            files: Observable::new(Arc::new(Vec::new())),
            metas: Observable::new(Arc::new(Vec::new())),
            chat: Observable::new(None),
            keys,
            providers,
            notifier,
            files_generation: Generation::default(),
            chat_generation: Generation::default(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn include_text(&self) -> &PersistentObservable<String> {
        &self.include_text
    }

    pub fn exclude_text(&self) -> &PersistentObservable<String> {
        &self.exclude_text
    }

    pub fn files(&self) -> &Observable<Arc<Vec<FileRef>>> {
        &self.files
    }

    pub fn metas(&self) -> &Observable<Arc<Vec<FileMeta>>> {
        &self.metas
    }

    pub fn chat(&self) -> &Observable<Option<Arc<Chat>>> {
        &self.chat
    }

    pub fn keys(&self) -> &ApiKeyResolver {
        &self.keys
    }

    /// Forward every file, metadata and answer update to `sink`
    pub fn subscribe_outbound<F>(&self, sink: F) -> OutboundSubscriptions
    where
        F: Fn(Outbound) + Send + Sync + 'static,
    {
        let sink = Arc::new(sink);

        let files_sink = Arc::clone(&sink);
        let files = self.files.subscribe(move |files: &Arc<Vec<FileRef>>| {
            files_sink(Outbound::Files {
                files: files.iter().map(|file| file.relative().to_string()).collect(),
            })
        });

        let metas_sink = Arc::clone(&sink);
        let metas = self
            .metas
            .subscribe(move |metas: &Arc<Vec<FileMeta>>| metas_sink(Outbound::metas(metas)));

        let chat = self.chat.subscribe(move |chat: &Option<Arc<Chat>>| {
            if let Some(chat) = chat {
                sink(Outbound::Answer {
                    chat: chat.as_ref().clone(),
                })
            }
        });

        OutboundSubscriptions { files, metas, chat }
    }

    pub fn unsubscribe_outbound(&self, subscriptions: OutboundSubscriptions) {
        self.files.unsubscribe(subscriptions.files);
        self.metas.unsubscribe(subscriptions.metas);
        self.chat.unsubscribe(subscriptions.chat);
    }

    /// Handle one inbound message, reporting any failure to the notifier
    pub async fn handle(&self, message: Inbound) {
        let result = match message {
            Inbound::SetInclude { text } => self.set_include(text).await,
            Inbound::SetExclude { text } => self.set_exclude(text).await,
            Inbound::Ask { question } => self.ask(&question).await.map(|_| ()),
            Inbound::SetApiKey { key } => self
                .keys
                .store(&key)
                .await
                .map(|_| self.notifier.show_info("OpenAI API key saved")),
            Inbound::ClearApiKey => self
                .keys
                .clear()
                .await
                .map(|_| self.notifier.show_info("OpenAI API key cleared")),
            Inbound::Refresh => self.refresh().await,
        };

        if let Err(e) = result {
            warn!(category = e.category(), "{}", e);
            self.notifier.show_error(&e.user_message());
        }
    }

    /// Store a new include text and recompute the selection if it changed
    pub async fn set_include(&self, text: String) -> Result<()> {
        if self.include_text.set_value(text).await? {
            self.refresh().await?;
        }
        Ok(())
    }

    /// Store a new exclude text and recompute the selection if it changed
    pub async fn set_exclude(&self, text: String) -> Result<()> {
        if self.exclude_text.set_value(text).await? {
            self.refresh().await?;
        }
        Ok(())
    }

    /// Recompute the selected files and then their metadata
    ///
    /// A refresh that is overtaken by a newer one drops its results.
    pub async fn refresh(&self) -> Result<()> {
        let ticket = self.files_generation.next();
        let include = self.include_text.get_value();
        let exclude = self.exclude_text.get_value();

        let files = Arc::new(self.selector.find_files(&include, &exclude).await?);
        if !self.files_generation.is_current(ticket) {
            debug!(ticket, "Dropping superseded file selection");
            return Ok(());
        }
        self.files.set_value(Arc::clone(&files));

        let metas = self.summarizer.compute_metas(&files).await?;
        if !self.files_generation.is_current(ticket) {
            debug!(ticket, "Dropping superseded file metadata");
            return Ok(());
        }
        self.metas.set_value(Arc::new(metas));

        Ok(())
    }

    /// Ask `question` about the selected files, streaming the answer into the
    /// chat observable
    pub async fn ask(&self, question: &str) -> Result<Arc<Chat>> {
        let api_key = self.keys.require().await?;
        let provider = self.providers.create(&api_key)?;

        let files = self.files.get_value();
        let contents = self.summarizer.read_contents(&files).await?;
        let prompt = build_prompt(&contents, question);

        let ticket = self.chat_generation.next();
        let question = question.trim().to_string();
        info!(
            provider = provider.provider_name(),
            files = files.len(),
            "Asking question"
        );

        self.chat.set_value(Some(Arc::new(Chat {
            question: question.clone(),
            answer: ChatAnswer::default(),
        })));

        let mut on_progress = |answer: &ChatAnswer| {
            if self.chat_generation.is_current(ticket) {
                self.chat.set_value(Some(Arc::new(Chat {
                    question: question.clone(),
                    answer: answer.clone(),
                })));
            }
        };

        match provider.send(&prompt, &mut on_progress).await {
            Ok(answer) => {
                let chat = Arc::new(Chat { question, answer });
                if self.chat_generation.is_current(ticket) {
                    self.chat.set_value(Some(Arc::clone(&chat)));
                } else {
                    debug!(ticket, "Dropping superseded answer");
                }
                Ok(chat)
            }
            Err(e) => {
                if self.chat_generation.is_current(ticket) {
                    self.chat.set_value(None);
                }
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatProvider, LlmError, ProgressFn};
    use crate::state::{MemorySecretStore, MemoryStore, SecretStore};
    use crate::ui::RecordingNotifier;
    use crate::utils::errors::AppError;
    use crate::utils::fs::{FsReader, WalkSearch};
    use crate::context::PatternGroup;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;
    use tokio::sync::Notify;

    fn touch(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    struct ScriptedProvider {
        deltas: Vec<&'static str>,
        fail: bool,
        prompts: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl ChatProvider for ScriptedProvider {
        fn provider_name(&self) -> &str {
            "scripted"
        }

        async fn send(&self, prompt: &str, on_progress: &mut ProgressFn<'_>) -> std::result::Result<ChatAnswer, LlmError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            if self.fail {
                return Err(LlmError::RequestFailed {
                    status: 500,
                    message: "upstream exploded".to_string(),
                });
            }

            let mut answer = ChatAnswer {
                id: "chatcmpl-1".to_string(),
                text: String::new(),
            };
            for delta in &self.deltas {
                answer.text.push_str(delta);
                on_progress(&answer);
            }
            Ok(answer)
        }
    }

    #[derive(Default)]
    struct ScriptedFactory {
        deltas: Vec<&'static str>,
        fail: bool,
        keys: Mutex<Vec<String>>,
        prompts: Arc<Mutex<Vec<String>>>,
    }

    impl ChatProviderFactory for ScriptedFactory {
        fn create(&self, api_key: &str) -> std::result::Result<Box<dyn ChatProvider>, LlmError> {
            self.keys.lock().unwrap().push(api_key.to_string());
            Ok(Box::new(ScriptedProvider {
                deltas: self.deltas.clone(),
                fail: self.fail,
                prompts: Arc::clone(&self.prompts),
            }))
        }
    }

    struct Fixture {
        _dir: TempDir,
        session: Session,
        notifier: Arc<RecordingNotifier>,
        factory: Arc<ScriptedFactory>,
        secrets: Arc<MemorySecretStore>,
    }

    fn fixture_with<S>(factory: ScriptedFactory, make_search: S) -> Fixture
    where
        S: FnOnce(&Path) -> Arc<dyn FileSearch>,
    {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "README.md", "# readme\n");
        touch(dir.path(), "src/main.rs", "fn main() {\n\n    run();\n}\n");
        touch(dir.path(), "src/lib.rs", "pub fn run() {}\n");
        touch(dir.path(), "target/debug/out.rs", "generated\n");
        touch(dir.path(), ".gitignore", "target/\n");

        let notifier = Arc::new(RecordingNotifier::new());
        let factory = Arc::new(factory);
        let secrets = Arc::new(MemorySecretStore::new());
        let search = make_search(dir.path());

        let session = Session::new(SessionDeps {
            root: dir.path().to_path_buf(),
            config: Config::default(),
            store: Arc::new(MemoryStore::new()),
            keys: ApiKeyResolver::with_env_var("GPTCTX_SESSION_TEST_UNSET_KEY", secrets.clone()),
            search,
            reader: Arc::new(FsReader),
            providers: factory.clone(),
            notifier: notifier.clone(),
        });

        Fixture {
            _dir: dir,
            session,
            notifier,
            factory,
            secrets,
        }
    }

    fn fixture(factory: ScriptedFactory) -> Fixture {
        fixture_with(factory, |root| Arc::new(WalkSearch::new(root)))
    }

    #[tokio::test]
    async fn test_include_change_cascades_to_files_and_metas() {
        let f = fixture(ScriptedFactory::default());
        let outbound = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&outbound);
        let _subs = f.session.subscribe_outbound(move |message| sink.lock().unwrap().push(message));

        f.session.handle(Inbound::SetInclude { text: "*.rs".to_string() }).await;

        assert!(f.notifier.errors().is_empty());
        let mut files: Vec<String> = f
            .session
            .files()
            .get_value()
            .iter()
            .map(|file| file.relative().to_string())
            .collect();
        files.sort();
        assert_eq!(files, vec!["src/lib.rs", "src/main.rs"]);

        let metas = f.session.metas().get_value();
        let main = metas.iter().find(|meta| meta.file.relative() == "src/main.rs").unwrap();
        assert_eq!(main.loc_count, 3);

        let messages = outbound.lock().unwrap();
        assert!(matches!(messages[0], Outbound::Files { ref files } if files.len() == 2));
        assert!(matches!(messages[1], Outbound::Metas { ref totals, .. } if totals.files == 2));
    }

    #[tokio::test]
    async fn test_unchanged_text_does_not_recompute() {
        let f = fixture(ScriptedFactory::default());
        f.session.set_include("*.md".to_string()).await.unwrap();
        let first = f.session.files().get_value();

        f.session.set_include("*.md".to_string()).await.unwrap();
        assert!(Arc::ptr_eq(&first, &f.session.files().get_value()));

        f.session.refresh().await.unwrap();
        assert!(!Arc::ptr_eq(&first, &f.session.files().get_value()));
    }

    #[tokio::test]
    async fn test_exclude_text_is_applied() {
        let f = fixture(ScriptedFactory::default());
        f.session.set_include("src".to_string()).await.unwrap();
        f.session.set_exclude("lib.rs".to_string()).await.unwrap();

        let files = f.session.files().get_value();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].relative(), "src/main.rs");
        assert_eq!(f.session.exclude_text().get_value(), "lib.rs");
    }

    #[tokio::test]
    async fn test_ask_without_key_reports_configuration_error() {
        let f = fixture(ScriptedFactory::default());
        f.session.handle(Inbound::Ask { question: "why?".to_string() }).await;

        assert_eq!(f.notifier.errors(), vec!["OpenAI API key is not set"]);
        assert!(f.session.chat().get_value().is_none());
        assert!(f.factory.keys.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ask_streams_answer_into_chat() {
        let f = fixture(ScriptedFactory {
            deltas: vec!["Hello", " ", "world"],
            ..ScriptedFactory::default()
        });
        f.session.handle(Inbound::SetApiKey { key: "sk-test".to_string() }).await;
        f.session.set_include("README.md".to_string()).await.unwrap();

        let texts = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&texts);
        let _sub = f.session.chat().subscribe(move |chat: &Option<Arc<Chat>>| {
            if let Some(chat) = chat {
                seen.lock().unwrap().push(chat.answer.text.clone());
            }
        });

        let chat = f.session.ask("  What is this?  ").await.unwrap();
        assert_eq!(chat.question, "What is this?");
        assert_eq!(chat.answer.text, "Hello world");
        assert_eq!(chat.answer.id, "chatcmpl-1");
        assert_eq!(f.session.chat().get_value().unwrap().answer.text, "Hello world");

        assert_eq!(*f.factory.keys.lock().unwrap(), vec!["sk-test"]);
        let prompts = f.factory.prompts.lock().unwrap();
        assert!(prompts[0].contains("README.md"));
        assert!(prompts[0].contains("# readme"));
        assert!(prompts[0].ends_with("What is this?"));

        assert_eq!(
            *texts.lock().unwrap(),
            vec!["", "Hello", "Hello ", "Hello world", "Hello world"]
        );
        assert_eq!(f.notifier.infos(), vec!["OpenAI API key saved"]);
    }

    #[tokio::test]
    async fn test_failed_request_clears_chat_and_notifies() {
        let f = fixture(ScriptedFactory {
            fail: true,
            ..ScriptedFactory::default()
        });
        f.secrets.set(crate::state::secrets::API_KEY_SECRET, "sk-test").await.unwrap();

        f.session.handle(Inbound::Ask { question: "hi".to_string() }).await;

        assert!(f.session.chat().get_value().is_none());
        let errors = f.notifier.errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("upstream exploded"));
    }

    #[tokio::test]
    async fn test_clear_api_key() {
        let f = fixture(ScriptedFactory::default());
        f.session.handle(Inbound::SetApiKey { key: "sk-test".to_string() }).await;
        f.session.handle(Inbound::ClearApiKey).await;

        assert!(f.session.keys().resolve().await.unwrap().is_none());
        assert_eq!(f.notifier.infos(), vec!["OpenAI API key saved", "OpenAI API key cleared"]);
    }

    #[tokio::test]
    async fn test_unreadable_ignore_file_is_reported() {
        let f = fixture(ScriptedFactory::default());
        let gitignore = f.session.root().join(".gitignore");
        std::fs::remove_file(&gitignore).unwrap();
        std::fs::create_dir(&gitignore).unwrap();

        f.session.handle(Inbound::SetInclude { text: "*.rs".to_string() }).await;

        assert_eq!(f.notifier.errors().len(), 1);
        assert!(f.session.files().get_value().is_empty());
        assert_eq!(f.session.include_text().get_value(), "*.rs");
    }

    /// Holds back searches whose include group mentions "slow"
    struct GatedSearch {
        root: PathBuf,
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl FileSearch for GatedSearch {
        async fn search(
            &self,
            include: &PatternGroup,
            _exclude: &PatternGroup,
            _max_results: usize,
        ) -> Result<Vec<FileRef>> {
            let name = if include.to_string().contains("slow") {
                self.gate.notified().await;
                "slow.txt"
            } else {
                "fast.txt"
            };
            Ok(vec![FileRef::under(&self.root, name)])
        }
    }

    #[tokio::test]
    async fn test_superseded_refresh_is_dropped() {
        let gate = Arc::new(Notify::new());
        let search_gate = Arc::clone(&gate);
        let f = fixture_with(ScriptedFactory::default(), move |root| {
            Arc::new(GatedSearch {
                root: root.to_path_buf(),
                gate: search_gate,
            })
        });
        touch(f.session.root(), "slow.txt", "slow\n");
        touch(f.session.root(), "fast.txt", "fast\n");

        let slow = f.session.set_include("slow".to_string());
        let fast = async {
            f.session.set_include("fast".to_string()).await?;
            gate.notify_one();
            Ok::<_, AppError>(())
        };
        let (slow, fast) = tokio::join!(slow, fast);
        slow.unwrap();
        fast.unwrap();

        let files = f.session.files().get_value();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].relative(), "fast.txt");
        assert_eq!(f.session.metas().get_value()[0].file.relative(), "fast.txt");
        assert_eq!(f.session.include_text().get_value(), "fast");
    }
}
