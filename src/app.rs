use chrono::Utc;
use eframe::egui;
use egui::{Color32, RichText, ScrollArea, Ui};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

use crate::auth::{AuthClient, Session};
use crate::blog_client::{post_link, RecordStore, SupabaseStore};
use crate::cache::{self, keys, CachedCell, Clock, Producer, SystemClock, FIVE_MINUTES, ONE_DAY, ONE_HOUR};
use crate::comments::CommentSection;
use crate::config::AppConfig;
use crate::db::KvStore;
use crate::display::{self, TextCache};
use crate::excerpt;
use crate::models::{Column, ColumnDetail, CommentNode, Post, PostPage};
use crate::rate_limit::SubmissionLimiter;
use crate::theme::AppTheme;
use crate::validation::{self, CommentForm, WriteForm, MAX_COMMENT_CHARS, MAX_EMAIL_CHARS, MAX_NAME_CHARS};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Route {
    Home,
    Post(String),
    Column(String),
    Write,
    CreateColumn,
    About,
    Login,
}

/// User intents collected while drawing a frame and applied afterwards.
enum Action {
    Navigate(Route),
    ToggleTheme,
    LoadMore,
    RetryColumns,
    RetryPage(usize),
    RetryPost,
    RetryColumn,
    EditPost(Post),
    AskDelete(Post),
    DeletePost(Post),
    CopyLink(Post),
    SubmitComment { parent_id: Option<String> },
    Reply(String),
    CancelReply,
    ReloadComments,
    ResetComments,
    SaveDraft,
    CreateColumn,
    Login,
    Logout,
    OpenUrl(String),
}

/// Results of writes and sign-in, delivered from worker threads.
enum Outcome {
    ColumnCreated(Result<(), String>),
    PostSaved {
        result: Result<String, String>,
        columns: Vec<String>,
    },
    PostDeleted {
        id: String,
        column_id: Option<String>,
        result: Result<(), String>,
    },
    SignedIn(anyhow::Result<Session>),
}

/// Shared handles every view needs to build its cache cells.
#[derive(Clone)]
struct Backend {
    store: Arc<dyn RecordStore>,
    kv: KvStore,
    clock: Arc<dyn Clock>,
}

impl Backend {
    fn cell<T, F>(&self, key: String, ttl: Duration, fetch: F) -> CachedCell<T>
    where
        T: Serialize + DeserializeOwned + Clone + Send + 'static,
        F: Fn(&dyn RecordStore) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        let store = self.store.clone();
        let producer: Producer<T> = Arc::new(move || fetch(store.as_ref()));
        CachedCell::with_clock(key, ttl, self.kv.clone(), producer, self.clock.clone())
    }
}

struct HomeView {
    columns: CachedCell<Vec<Column>>,
    pages: Vec<CachedCell<PostPage>>,
}

impl HomeView {
    fn new(backend: &Backend) -> Self {
        let mut view = Self {
            columns: backend.cell(keys::HOMEPAGE_COLUMNS.to_string(), ONE_DAY, |store| store.list_columns()),
            pages: Vec::new(),
        };
        view.push_page(backend);
        view
    }

    fn push_page(&mut self, backend: &Backend) {
        let page = self.pages.len() + 1;
        self.pages.push(backend.cell(keys::homepage_posts(page), FIVE_MINUTES, move |store| {
            store.list_home_posts(page)
        }));
    }

    fn activate(&mut self) {
        self.columns.activate(&[]);
        for page in &mut self.pages {
            page.activate(&[]);
        }
    }

    fn poll(&mut self) -> bool {
        let mut changed = self.columns.poll();
        for page in &mut self.pages {
            changed |= page.poll();
        }
        changed
    }

    fn loading(&self) -> bool {
        self.columns.loading() || self.pages.iter().any(|p| p.loading())
    }

    fn can_load_more(&self) -> bool {
        self.pages
            .last()
            .map_or(false, |cell| !cell.loading() && cell.data().map_or(false, |page| page.has_more))
    }
}

struct PostView {
    id: String,
    detail: CachedCell<Post>,
    form: CommentForm,
    reply_to: Option<String>,
    reply_form: CommentForm,
}

impl PostView {
    fn new(backend: &Backend, id: &str) -> Self {
        let post_id = id.to_string();
        Self {
            id: id.to_string(),
            detail: backend.cell(keys::post_detail(id), ONE_HOUR, move |store| store.get_post(&post_id)),
            form: CommentForm::default(),
            reply_to: None,
            reply_form: CommentForm::default(),
        }
    }
}

struct ColumnView {
    id: String,
    detail: CachedCell<ColumnDetail>,
}

impl ColumnView {
    fn new(backend: &Backend, id: &str) -> Self {
        let column_id = id.to_string();
        Self {
            id: id.to_string(),
            detail: backend.cell(keys::column_detail(id), ONE_HOUR, move |store| {
                let column = store.get_column(&column_id)?;
                let posts = store.list_column_posts(&column_id)?;
                Ok(ColumnDetail { column, posts })
            }),
        }
    }
}

#[derive(Default)]
struct WriteState {
    form: WriteForm,
    /// The post being edited; `None` when writing a new one.
    editing: Option<Post>,
}

impl WriteState {
    fn editing(post: &Post) -> Self {
        Self {
            form: WriteForm {
                content: post.content.clone(),
                slug: post.slug.clone().unwrap_or_default(),
                is_published: post.is_published,
                column_id: post.column_id.clone(),
            },
            editing: Some(post.clone()),
        }
    }
}

#[derive(Default)]
struct ColumnFormState {
    title: String,
    description: String,
}

#[derive(Default)]
struct LoginState {
    email: String,
    password: String,
}

pub struct BlogApp {
    config: AppConfig,
    backend: Backend,
    auth: AuthClient,
    theme: AppTheme,
    is_dark_mode: bool,
    route: Route,
    home: HomeView,
    post: Option<PostView>,
    column: Option<ColumnView>,
    comments: Option<CommentSection>,
    write: WriteState,
    new_column: ColumnFormState,
    login: LoginState,
    alert: Option<String>,
    confirm_delete: Option<Post>,
    text: TextCache,
    busy: bool,
    outcome_tx: Sender<Outcome>,
    outcome_rx: Receiver<Outcome>,
    pending: Vec<Action>,
}

impl BlogApp {
    pub fn new(config: AppConfig, kv: KvStore, is_dark_mode: bool) -> anyhow::Result<Self> {
        let auth = AuthClient::new(&config)?;
        let store: Arc<dyn RecordStore> = Arc::new(SupabaseStore::new(&config, auth.session_handle())?);
        let backend = Backend {
            store,
            kv,
            clock: Arc::new(SystemClock),
        };
        let (outcome_tx, outcome_rx) = mpsc::channel();
        info!(origin = %config.origin(), admin = config.admin_enabled, "blog reader started");

        Ok(Self {
            home: HomeView::new(&backend),
            config,
            backend,
            auth,
            theme: AppTheme::for_mode(is_dark_mode),
            is_dark_mode,
            route: Route::Home,
            post: None,
            column: None,
            comments: None,
            write: WriteState::default(),
            new_column: ColumnFormState::default(),
            login: LoginState::default(),
            alert: None,
            confirm_delete: None,
            text: TextCache::default(),
            busy: false,
            outcome_tx,
            outcome_rx,
            pending: Vec::new(),
        })
    }

    fn toggle_theme(&mut self) {
        self.is_dark_mode = !self.is_dark_mode;
        self.theme = AppTheme::for_mode(self.is_dark_mode);
    }

    fn open_link(&mut self, url: &str) {
        if let Err(e) = open::that(url) {
            warn!(url, error = %e, "failed to open URL");
            self.alert = Some(format!("Could not open {}", url));
        }
    }

    fn navigate(&mut self, route: Route) {
        match &route {
            Route::Write | Route::CreateColumn if !self.auth.is_signed_in() => {
                self.alert = Some("Please log in first".to_string());
                self.route = Route::Login;
                return;
            }
            Route::Write => {
                // The nav entry always starts a fresh post.
                if self.write.editing.is_some() {
                    self.write = WriteState::default();
                }
            }
            Route::Post(id) => self.open_post(id),
            Route::Column(id) => {
                if self.column.as_ref().map_or(true, |c| &c.id != id) {
                    self.column = Some(ColumnView::new(&self.backend, id));
                }
            }
            _ => {}
        }
        self.route = route;
    }

    fn open_post(&mut self, id: &str) {
        if self.post.as_ref().map_or(true, |p| p.id != id) {
            self.post = Some(PostView::new(&self.backend, id));
        }
        match &mut self.comments {
            Some(section) => section.set_post(id),
            None => {
                self.comments = Some(CommentSection::new(
                    id,
                    self.backend.store.clone(),
                    self.backend.clock.clone(),
                    SubmissionLimiter::default(),
                ))
            }
        }
    }

    /// Activates the cells the current page reads. Cheap when nothing changed.
    fn activate_route(&mut self) {
        match &self.route {
            Route::Home => self.home.activate(),
            Route::Post(_) => {
                if let Some(view) = &mut self.post {
                    view.detail.activate(&[]);
                }
            }
            Route::Column(_) => {
                if let Some(view) = &mut self.column {
                    view.detail.activate(&[]);
                }
            }
            Route::Write => self.home.columns.activate(&[]),
            _ => {}
        }
    }

    fn poll_background(&mut self) {
        self.home.poll();
        if let Some(view) = &mut self.post {
            view.detail.poll();
        }
        if let Some(view) = &mut self.column {
            view.detail.poll();
        }
        if let Some(section) = &mut self.comments {
            section.poll();
            if let Some(message) = section.take_alert() {
                self.alert = Some(message);
            }
        }
        while let Ok(outcome) = self.outcome_rx.try_recv() {
            self.handle_outcome(outcome);
        }
    }

    fn is_waiting(&self) -> bool {
        self.busy
            || self.home.loading()
            || self.post.as_ref().map_or(false, |v| v.detail.loading())
            || self.column.as_ref().map_or(false, |v| v.detail.loading())
            || self
                .comments
                .as_ref()
                .map_or(false, |s| s.loading() || s.submitting())
    }

    fn apply(&mut self, action: Action) {
        match action {
            Action::Navigate(route) => self.navigate(route),
            Action::ToggleTheme => self.toggle_theme(),
            Action::LoadMore => self.home.push_page(&self.backend),
            Action::RetryColumns => self.home.columns.refetch(),
            Action::RetryPage(index) => {
                if let Some(cell) = self.home.pages.get_mut(index) {
                    cell.refetch();
                }
            }
            Action::RetryPost => {
                if let Some(view) = &mut self.post {
                    view.detail.refetch();
                }
            }
            Action::RetryColumn => {
                if let Some(view) = &mut self.column {
                    view.detail.refetch();
                }
            }
            Action::EditPost(post) => {
                self.write = WriteState::editing(&post);
                self.route = Route::Write;
            }
            Action::AskDelete(post) => self.confirm_delete = Some(post),
            Action::DeletePost(post) => self.delete_post(post),
            Action::CopyLink(post) => self.copy_link(&post),
            Action::SubmitComment { parent_id } => self.submit_comment(parent_id),
            Action::Reply(id) => {
                if let Some(view) = &mut self.post {
                    if view.reply_form.author_name.is_empty() && view.reply_form.author_email.is_empty() {
                        view.reply_form.author_name = view.form.author_name.clone();
                        view.reply_form.author_email = view.form.author_email.clone();
                    }
                    view.reply_to = Some(id);
                }
            }
            Action::CancelReply => {
                if let Some(view) = &mut self.post {
                    view.reply_to = None;
                }
            }
            Action::ReloadComments => {
                if let Some(section) = &mut self.comments {
                    section.load();
                }
            }
            Action::ResetComments => {
                if let Some(section) = &mut self.comments {
                    section.reset();
                }
            }
            Action::SaveDraft => self.save_draft(),
            Action::CreateColumn => self.create_column(),
            Action::Login => self.login(),
            Action::Logout => {
                self.auth.logout();
                if matches!(self.route, Route::Write | Route::CreateColumn) {
                    self.navigate(Route::Home);
                }
            }
            Action::OpenUrl(url) => self.open_link(&url),
        }
    }

    fn submit_comment(&mut self, parent_id: Option<String>) {
        let (Some(view), Some(section)) = (self.post.as_mut(), self.comments.as_mut()) else {
            return;
        };
        let form = if parent_id.is_some() {
            &mut view.reply_form
        } else {
            &mut view.form
        };

        match section.submit(form, parent_id.as_deref()) {
            Ok(()) => {
                form.clear_content();
                if parent_id.is_some() {
                    view.reply_to = None;
                }
            }
            Err(e) => self.alert = Some(e.to_string()),
        }
    }

    fn copy_link(&mut self, post: &Post) {
        let Some(site_url) = self.config.site_url.as_deref() else {
            self.alert = Some("Set BLOG_SITE_URL to share post links".to_string());
            return;
        };
        let link = post_link(site_url, post);
        match arboard::Clipboard::new().and_then(|mut clipboard| clipboard.set_text(link.clone())) {
            Ok(()) => {
                info!(link = %link, "copied post link");
                self.alert = Some("Link copied to clipboard".to_string());
            }
            Err(e) => {
                warn!(error = %e, "clipboard unavailable");
                self.alert = Some(format!("Could not copy link: {}", link));
            }
        }
    }

    fn save_draft(&mut self) {
        if self.busy {
            return;
        }
        let draft = match self.write.form.to_draft() {
            Ok(draft) => draft,
            Err(e) => {
                self.alert = Some(e.to_string());
                return;
            }
        };

        let edited = self.write.editing.as_ref().map(|p| p.id.clone());
        let mut columns: Vec<String> = draft.column_id.iter().cloned().collect();
        if let Some(previous) = self.write.editing.as_ref().and_then(|p| p.column_id.clone()) {
            if !columns.contains(&previous) {
                columns.push(previous);
            }
        }

        self.busy = true;
        let store = self.backend.store.clone();
        let tx = self.outcome_tx.clone();
        thread::spawn(move || {
            let result = match &edited {
                Some(id) => store.update_post(id, &draft).map(|_| id.clone()),
                None => store.insert_post(&draft),
            };
            let _ = tx.send(Outcome::PostSaved {
                result: result.map_err(|e| e.to_string()),
                columns,
            });
        });
    }

    fn delete_post(&mut self, post: Post) {
        if self.busy {
            return;
        }
        self.busy = true;
        let store = self.backend.store.clone();
        let tx = self.outcome_tx.clone();
        thread::spawn(move || {
            let result = store.delete_post(&post.id).map_err(|e| e.to_string());
            let _ = tx.send(Outcome::PostDeleted {
                id: post.id,
                column_id: post.column_id,
                result,
            });
        });
    }

    fn create_column(&mut self) {
        if self.busy {
            return;
        }
        let column = match validation::validate_column(&self.new_column.title, &self.new_column.description) {
            Ok(column) => column,
            Err(e) => {
                self.alert = Some(e.to_string());
                return;
            }
        };

        self.busy = true;
        let store = self.backend.store.clone();
        let tx = self.outcome_tx.clone();
        thread::spawn(move || {
            let result = store.insert_column(&column).map_err(|e| e.to_string());
            let _ = tx.send(Outcome::ColumnCreated(result));
        });
    }

    fn login(&mut self) {
        if self.busy {
            return;
        }
        if let Err(e) = validation::validate_login(&self.login.email, &self.login.password) {
            self.alert = Some(e.to_string());
            return;
        }

        self.busy = true;
        self.auth.clear_error();
        let request = self.auth.login_request(&self.login.email, &self.login.password);
        let tx = self.outcome_tx.clone();
        thread::spawn(move || {
            let _ = tx.send(Outcome::SignedIn(request.send()));
        });
    }

    /// Drops cached pages a post write made stale and rebuilds the views
    /// that read them.
    fn invalidate_post(&mut self, post_id: &str, columns: &[String]) {
        if let Err(e) = cache::invalidate_post(&self.backend.kv, Some(post_id), columns) {
            warn!(error = %e, "cache invalidation failed");
        }
        self.home = HomeView::new(&self.backend);
        if self.post.as_ref().map_or(false, |v| v.id == post_id) {
            self.post = None;
        }
        if self.column.as_ref().map_or(false, |v| columns.contains(&v.id)) {
            self.column = None;
        }
    }

    fn handle_outcome(&mut self, outcome: Outcome) {
        self.busy = false;
        match outcome {
            Outcome::ColumnCreated(Ok(())) => {
                if let Err(e) = cache::invalidate_columns(&self.backend.kv) {
                    warn!(error = %e, "cache invalidation failed");
                }
                self.new_column = ColumnFormState::default();
                self.home = HomeView::new(&self.backend);
                self.alert = Some("Column created".to_string());
                self.navigate(Route::Home);
            }
            Outcome::ColumnCreated(Err(e)) => {
                self.alert = Some(format!("Failed to create column: {}", e));
            }
            Outcome::PostSaved { result: Ok(id), columns } => {
                self.invalidate_post(&id, &columns);
                self.write = WriteState::default();
                self.navigate(Route::Post(id));
            }
            Outcome::PostSaved { result: Err(e), .. } => {
                self.alert = Some(format!("Failed to save post: {}", e));
            }
            Outcome::PostDeleted { id, column_id, result: Ok(()) } => {
                let columns: Vec<String> = column_id.into_iter().collect();
                self.invalidate_post(&id, &columns);
                self.alert = Some("Post deleted".to_string());
                self.navigate(Route::Home);
            }
            Outcome::PostDeleted { result: Err(e), .. } => {
                self.alert = Some(format!("Failed to delete post: {}", e));
            }
            Outcome::SignedIn(result) => {
                if self.auth.finish_login(result) {
                    self.login = LoginState::default();
                    self.navigate(Route::Home);
                } else {
                    self.login.password.clear();
                    self.alert = self.auth.error().map(str::to_string);
                }
            }
        }
    }

    fn render_header(&mut self, ui: &mut Ui) {
        let theme = &self.theme;
        let actions = &mut self.pending;
        let route = &self.route;
        let signed_in = self.auth.is_signed_in();

        ui.add_space(6.0);
        ui.horizontal(|ui| {
            let title = ui.add(
                egui::Label::new(RichText::new("Blog").color(theme.highlight).size(24.0).strong())
                    .sense(egui::Sense::click()),
            );
            if title.clicked() {
                actions.push(Action::Navigate(Route::Home));
            }
            if title.hovered() {
                ui.output_mut(|o| o.cursor_icon = egui::CursorIcon::PointingHand);
            }
            ui.add_space(20.0);

            nav(ui, theme, actions, "Home", Route::Home, route);
            nav(ui, theme, actions, "About", Route::About, route);
            if self.config.admin_enabled {
                if signed_in {
                    nav(ui, theme, actions, "Write", Route::Write, route);
                    nav(ui, theme, actions, "New column", Route::CreateColumn, route);
                    if ui.add(theme.button("Log out")).clicked() {
                        actions.push(Action::Logout);
                    }
                } else {
                    nav(ui, theme, actions, "Log in", Route::Login, route);
                }
            }

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                let icon = if self.is_dark_mode { "☀" } else { "🌙" };
                let theme_btn = ui.add(
                    egui::Button::new(RichText::new(icon).color(theme.button_foreground).size(18.0))
                        .min_size(egui::Vec2::new(32.0, 32.0))
                        .corner_radius(egui::CornerRadius::same(16))
                        .fill(theme.button_background),
                );
                if theme_btn.clicked() {
                    actions.push(Action::ToggleTheme);
                }
                if self.busy {
                    ui.spinner();
                }
                if let Some(email) = self.auth.current_user().and_then(|u| u.email) {
                    ui.label(RichText::new(email).color(theme.secondary_text).size(13.0));
                }
            });
        });
        ui.add_space(6.0);
    }

    fn render_route(&mut self, ui: &mut Ui) {
        match self.route.clone() {
            Route::Home => self.render_home(ui),
            Route::Post(_) => self.render_post(ui),
            Route::Column(_) => self.render_column(ui),
            Route::Write => self.render_write(ui),
            Route::CreateColumn => self.render_create_column(ui),
            Route::About => self.render_about(ui),
            Route::Login => self.render_login(ui),
        }
    }

    fn render_home(&mut self, ui: &mut Ui) {
        let theme = &self.theme;
        let actions = &mut self.pending;
        let text = &mut self.text;
        let home = &self.home;

        section_heading(ui, theme, "Columns");
        if let Some(columns) = home.columns.data() {
            if columns.is_empty() && !home.columns.loading() {
                muted(ui, theme, "No columns yet");
            }
            for column in columns {
                column_card(ui, theme, column, actions);
            }
        }
        cell_status(ui, theme, home.columns.loading(), home.columns.error(), Action::RetryColumns, actions);

        ui.add_space(16.0);
        section_heading(ui, theme, "Latest posts");
        let mut shown = 0;
        for (index, page) in home.pages.iter().enumerate() {
            if let Some(data) = page.data() {
                for post in &data.posts {
                    post_card(ui, theme, text, post, actions);
                    shown += 1;
                }
            }
            cell_status(ui, theme, page.loading(), page.error(), Action::RetryPage(index), actions);
        }
        if shown == 0 && !home.loading() && home.pages.iter().all(|p| p.error().is_none()) {
            muted(ui, theme, "No posts yet");
        }

        if home.can_load_more() {
            ui.add_space(8.0);
            ui.vertical_centered(|ui| {
                if ui.add(theme.button("Load more")).clicked() {
                    actions.push(Action::LoadMore);
                }
            });
        }
    }

    fn render_post(&mut self, ui: &mut Ui) {
        let theme = &self.theme;
        let actions = &mut self.pending;
        let text = &mut self.text;
        let signed_in = self.auth.is_signed_in();
        let Some(view) = self.post.as_mut() else {
            muted(ui, theme, "Post not found");
            return;
        };

        back_button(ui, theme, actions);
        let detail = &view.detail;
        cell_status(
            ui,
            theme,
            detail.loading() && detail.data().is_none(),
            detail.error(),
            Action::RetryPost,
            actions,
        );

        if let Some(post) = detail.data() {
            ui.label(RichText::new(&post.title).color(theme.text).size(26.0).strong());
            ui.horizontal(|ui| {
                ui.label(RichText::new(display::post_date(post.created_at)).color(theme.secondary_text).size(13.0));
                if let Some(updated) = post.updated_at {
                    ui.label(
                        RichText::new(format!("updated {}", display::post_date(updated)))
                            .color(theme.secondary_text)
                            .size(13.0),
                    );
                }
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if signed_in {
                        let delete = egui::Button::new(RichText::new("Delete").color(Color32::WHITE).size(15.0))
                            .corner_radius(egui::CornerRadius::same(6))
                            .fill(theme.danger);
                        if ui.add(delete).clicked() {
                            actions.push(Action::AskDelete(post.clone()));
                        }
                        if ui.add(theme.button("Edit")).clicked() {
                            actions.push(Action::EditPost(post.clone()));
                        }
                    }
                    if ui.add(theme.button("Copy link")).clicked() {
                        actions.push(Action::CopyLink(post.clone()));
                    }
                });
            });
            ui.separator();
            for block in text.article_blocks(&post.content) {
                ui.label(RichText::new(block.as_str()).color(theme.text).size(16.0));
                ui.add_space(8.0);
            }
        }

        ui.add_space(16.0);
        if let Some(section) = &self.comments {
            render_comments(ui, theme, text, section, view, actions);
        }
    }

    fn render_column(&mut self, ui: &mut Ui) {
        let theme = &self.theme;
        let actions = &mut self.pending;
        let text = &mut self.text;
        let Some(view) = &self.column else {
            muted(ui, theme, "Column not found");
            return;
        };

        back_button(ui, theme, actions);
        let detail = &view.detail;
        cell_status(
            ui,
            theme,
            detail.loading() && detail.data().is_none(),
            detail.error(),
            Action::RetryColumn,
            actions,
        );

        let Some(data) = detail.data() else {
            return;
        };
        ui.label(RichText::new(&data.column.title).color(theme.text).size(26.0).strong());
        if !data.column.description.is_empty() {
            ui.label(RichText::new(&data.column.description).color(theme.secondary_text).size(15.0));
        }
        ui.separator();

        if data.posts.is_empty() {
            muted(ui, theme, "No posts in this column yet");
            return;
        }

        section_heading(ui, theme, "Contents");
        for (i, post) in data.posts.iter().enumerate() {
            let entry = ui.add(
                egui::Label::new(RichText::new(format!("{}. {}", i + 1, post.title)).color(theme.highlight).size(15.0))
                    .sense(egui::Sense::click()),
            );
            if entry.clicked() {
                actions.push(Action::Navigate(Route::Post(post.id.clone())));
            }
        }
        ui.add_space(12.0);
        for post in &data.posts {
            post_card(ui, theme, text, post, actions);
        }
    }

    fn render_write(&mut self, ui: &mut Ui) {
        let theme = &self.theme;
        let actions = &mut self.pending;
        let write = &mut self.write;
        let columns = self.home.columns.data();
        let busy = self.busy;

        let heading = if write.editing.is_some() { "Edit post" } else { "Write a post" };
        section_heading(ui, theme, heading);
        muted(ui, theme, "Paste the post as HTML. The title comes from its <title> element.");
        ui.add_space(6.0);

        ui.add(
            egui::TextEdit::multiline(&mut write.form.content)
                .code_editor()
                .hint_text("<!DOCTYPE html>\n<html><head><title>My post</title></head><body>...</body></html>")
                .desired_rows(18)
                .desired_width(f32::INFINITY),
        );
        ui.add_space(6.0);
        ui.label(
            RichText::new(format!("Title: {}", validation::extract_title(&write.form.content)))
                .color(theme.secondary_text)
                .size(14.0),
        );

        ui.horizontal(|ui| {
            ui.label(RichText::new("Slug").color(theme.text));
            ui.add(
                egui::TextEdit::singleline(&mut write.form.slug)
                    .hint_text("generated from the title when empty")
                    .desired_width(280.0),
            );
        });

        ui.horizontal(|ui| {
            ui.checkbox(&mut write.form.is_published, "Publish");
            ui.add_space(16.0);
            let selected = write
                .form
                .column_id
                .as_ref()
                .and_then(|id| columns.and_then(|list| list.iter().find(|c| &c.id == id)))
                .map(|c| c.title.clone())
                .unwrap_or_else(|| "No column".to_string());
            egui::ComboBox::from_label("Column")
                .selected_text(selected)
                .show_ui(ui, |ui| {
                    ui.selectable_value(&mut write.form.column_id, None, "No column");
                    for column in columns.into_iter().flatten() {
                        ui.selectable_value(&mut write.form.column_id, Some(column.id.clone()), column.title.as_str());
                    }
                });
        });

        ui.add_space(10.0);
        ui.horizontal(|ui| {
            let label = if busy { "Saving..." } else { "Save" };
            if ui.add_enabled(!busy, theme.primary_button(label)).clicked() {
                actions.push(Action::SaveDraft);
            }
            if ui.add(theme.button("Cancel")).clicked() {
                let back = match &write.editing {
                    Some(post) => Route::Post(post.id.clone()),
                    None => Route::Home,
                };
                actions.push(Action::Navigate(back));
            }
        });
    }

    fn render_create_column(&mut self, ui: &mut Ui) {
        let theme = &self.theme;
        let actions = &mut self.pending;
        let form = &mut self.new_column;
        let busy = self.busy;

        section_heading(ui, theme, "New column");
        ui.add(
            egui::TextEdit::singleline(&mut form.title)
                .hint_text("Title")
                .desired_width(f32::INFINITY),
        );
        ui.add_space(6.0);
        ui.add(
            egui::TextEdit::multiline(&mut form.description)
                .hint_text("Description")
                .desired_rows(4)
                .desired_width(f32::INFINITY),
        );
        ui.add_space(10.0);
        ui.horizontal(|ui| {
            let label = if busy { "Creating..." } else { "Create" };
            if ui.add_enabled(!busy, theme.primary_button(label)).clicked() {
                actions.push(Action::CreateColumn);
            }
            if ui.add(theme.button("Cancel")).clicked() {
                actions.push(Action::Navigate(Route::Home));
            }
        });
    }

    fn render_login(&mut self, ui: &mut Ui) {
        let theme = &self.theme;
        let actions = &mut self.pending;
        let form = &mut self.login;
        let busy = self.busy;

        section_heading(ui, theme, "Log in");
        ui.add(
            egui::TextEdit::singleline(&mut form.email)
                .hint_text("Email")
                .desired_width(320.0),
        );
        ui.add_space(6.0);
        let password = ui.add(
            egui::TextEdit::singleline(&mut form.password)
                .password(true)
                .hint_text("Password")
                .desired_width(320.0),
        );
        let submitted = password.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
        ui.add_space(10.0);
        let label = if busy { "Logging in..." } else { "Log in" };
        if (ui.add_enabled(!busy, theme.primary_button(label)).clicked() || submitted) && !busy {
            actions.push(Action::Login);
        }
    }

    fn render_about(&mut self, ui: &mut Ui) {
        let theme = &self.theme;
        let actions = &mut self.pending;

        section_heading(ui, theme, "About");
        ui.label(
            RichText::new(
                "A native reader for a hosted blog. Posts can be grouped into columns, \
                 and readers can leave threaded comments on every post.",
            )
            .color(theme.text)
            .size(15.0),
        );
        ui.add_space(8.0);
        if let Some(site_url) = &self.config.site_url {
            ui.horizontal(|ui| {
                ui.label(RichText::new("Website:").color(theme.secondary_text));
                if ui.link(site_url).clicked() {
                    actions.push(Action::OpenUrl(site_url.clone()));
                }
            });
        }
        ui.horizontal(|ui| {
            ui.label(RichText::new("Backend:").color(theme.secondary_text));
            let origin = self.config.origin();
            if ui.link(origin).clicked() {
                actions.push(Action::OpenUrl(origin.to_string()));
            }
        });
    }

    fn render_alert(&mut self, ctx: &egui::Context) {
        let Some(message) = self.alert.clone() else {
            return;
        };
        let mut open = true;
        let mut dismissed = false;
        egui::Window::new("Notice")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .open(&mut open)
            .show(ctx, |ui| {
                ui.label(RichText::new(&message).color(self.theme.text).size(15.0));
                ui.add_space(8.0);
                if ui.add(self.theme.primary_button("OK")).clicked() {
                    dismissed = true;
                }
            });
        if !open || dismissed {
            self.alert = None;
        }
    }

    fn render_delete_confirm(&mut self, ctx: &egui::Context) {
        let Some(post) = self.confirm_delete.clone() else {
            return;
        };
        let mut decision = None;
        egui::Window::new("Delete post")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.label(
                    RichText::new(format!("Delete \"{}\"? This cannot be undone.", post.title))
                        .color(self.theme.text)
                        .size(15.0),
                );
                ui.add_space(8.0);
                ui.horizontal(|ui| {
                    let delete = egui::Button::new(RichText::new("Delete").color(Color32::WHITE).size(15.0))
                        .corner_radius(egui::CornerRadius::same(6))
                        .fill(self.theme.danger);
                    if ui.add(delete).clicked() {
                        decision = Some(true);
                    }
                    if ui.add(self.theme.button("Cancel")).clicked() {
                        decision = Some(false);
                    }
                });
            });
        match decision {
            Some(true) => {
                self.confirm_delete = None;
                self.pending.push(Action::DeletePost(post));
            }
            Some(false) => self.confirm_delete = None,
            None => {}
        }
    }
}

impl eframe::App for BlogApp {
    fn save(&mut self, storage: &mut dyn eframe::Storage) {
        storage.set_string("is_dark_mode", self.is_dark_mode.to_string());
    }

    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.theme.apply_to_ctx(ctx);
        self.activate_route();
        self.poll_background();

        egui::TopBottomPanel::top("header").show(ctx, |ui| self.render_header(ui));
        egui::CentralPanel::default().show(ctx, |ui| {
            ScrollArea::vertical()
                .auto_shrink([false, false])
                .show(ui, |ui| self.render_route(ui));
        });
        self.render_alert(ctx);
        self.render_delete_confirm(ctx);

        for action in std::mem::take(&mut self.pending) {
            self.apply(action);
        }

        // Worker threads cannot wake the UI, so keep polling while they run.
        if self.is_waiting() {
            ctx.request_repaint_after(Duration::from_millis(100));
        }
    }
}

/// Shown instead of the blog when required settings are missing.
pub struct SetupScreen {
    message: String,
    theme: AppTheme,
}

impl SetupScreen {
    pub fn new(message: String, is_dark_mode: bool) -> Self {
        Self {
            message,
            theme: AppTheme::for_mode(is_dark_mode),
        }
    }
}

impl eframe::App for SetupScreen {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.theme.apply_to_ctx(ctx);
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.add_space(24.0);
            section_heading(ui, &self.theme, "Configuration needed");
            ui.label(RichText::new(&self.message).color(self.theme.danger).size(15.0));
            ui.add_space(12.0);
            for (name, purpose) in [
                ("BLOG_SUPABASE_URL", "project URL (required)"),
                ("BLOG_SUPABASE_ANON_KEY", "public anon key (required)"),
                ("BLOG_SITE_URL", "public site address for shareable links"),
                ("BLOG_ADMIN_ENABLED", "show writing and login pages"),
                ("BLOG_CACHE_PATH", "cache database location"),
            ] {
                ui.horizontal(|ui| {
                    ui.label(RichText::new(name).monospace().color(self.theme.highlight));
                    ui.label(RichText::new(purpose).color(self.theme.secondary_text));
                });
            }
            ui.add_space(12.0);
            muted(ui, &self.theme, "Set these in the environment or a .env file and restart.");
        });
    }
}

fn nav(ui: &mut Ui, theme: &AppTheme, actions: &mut Vec<Action>, label: &str, target: Route, current: &Route) {
    let active = match (&target, current) {
        (Route::Home, Route::Post(_) | Route::Column(_)) => true,
        _ => &target == current,
    };
    if ui.add(theme.nav_button(label, active)).clicked() {
        actions.push(Action::Navigate(target));
    }
}

fn section_heading(ui: &mut Ui, theme: &AppTheme, text: &str) {
    ui.add_space(4.0);
    ui.label(RichText::new(text).color(theme.text).size(20.0).strong());
    ui.add_space(4.0);
}

fn muted(ui: &mut Ui, theme: &AppTheme, text: &str) {
    ui.label(RichText::new(text).color(theme.secondary_text).italics().size(14.0));
}

fn back_button(ui: &mut Ui, theme: &AppTheme, actions: &mut Vec<Action>) {
    if ui.add(theme.button("← Back")).clicked() {
        actions.push(Action::Navigate(Route::Home));
    }
    ui.add_space(8.0);
}

/// Spinner while loading, or the error with a retry button.
fn cell_status(
    ui: &mut Ui,
    theme: &AppTheme,
    loading: bool,
    error: Option<&str>,
    retry: Action,
    actions: &mut Vec<Action>,
) {
    if loading {
        ui.horizontal(|ui| {
            ui.spinner();
            ui.label(RichText::new("Loading...").color(theme.secondary_text));
        });
    } else if let Some(error) = error {
        ui.horizontal(|ui| {
            ui.label(RichText::new(format!("Failed to load: {}", error)).color(theme.danger));
            if ui.add(theme.button("Retry")).clicked() {
                actions.push(retry);
            }
        });
    }
}

fn clickable_title(ui: &mut Ui, text: RichText) -> egui::Response {
    let response = ui.add(egui::Label::new(text).sense(egui::Sense::click()));
    if response.hovered() {
        ui.output_mut(|o| o.cursor_icon = egui::CursorIcon::PointingHand);
    }
    response
}

fn post_card(ui: &mut Ui, theme: &AppTheme, text: &mut TextCache, post: &Post, actions: &mut Vec<Action>) {
    theme.card().show(ui, |ui| {
        ui.set_width(ui.available_width());
        let title = RichText::new(excerpt::short_title(&post.title)).color(theme.text).size(18.0).strong();
        if clickable_title(ui, title).clicked() {
            actions.push(Action::Navigate(Route::Post(post.id.clone())));
        }
        ui.label(RichText::new(display::post_date(post.created_at)).color(theme.secondary_text).size(13.0));
        let preview = text.excerpt(&post.content);
        if !preview.is_empty() {
            ui.add_space(4.0);
            ui.label(RichText::new(preview).color(theme.text).size(15.0));
        }
    });
}

fn column_card(ui: &mut Ui, theme: &AppTheme, column: &Column, actions: &mut Vec<Action>) {
    theme.card().show(ui, |ui| {
        ui.set_width(ui.available_width());
        let title = RichText::new(excerpt::short_title(&column.title)).color(theme.accent).size(18.0).strong();
        if clickable_title(ui, title).clicked() {
            actions.push(Action::Navigate(Route::Column(column.id.clone())));
        }
        if !column.description.is_empty() {
            ui.label(
                RichText::new(excerpt::truncate(&column.description, excerpt::EXCERPT_BUDGET))
                    .color(theme.secondary_text)
                    .size(14.0),
            );
        }
    });
}

fn render_comments(
    ui: &mut Ui,
    theme: &AppTheme,
    text: &mut TextCache,
    section: &CommentSection,
    view: &mut PostView,
    actions: &mut Vec<Action>,
) {
    ui.horizontal(|ui| {
        ui.label(
            RichText::new(format!("Comments ({})", section.tree().len()))
                .color(theme.text)
                .size(20.0)
                .strong(),
        );
        if section.submit_count() > 0 && ui.add(theme.button("Refresh")).clicked() {
            actions.push(Action::ResetComments);
        }
    });
    ui.add_space(6.0);

    comment_form(ui, theme, &mut view.form, None, section.submitting(), actions);
    ui.add_space(10.0);

    if section.loading() {
        ui.horizontal(|ui| {
            ui.spinner();
            ui.label(RichText::new("Loading comments...").color(theme.secondary_text));
        });
    } else if let Some(error) = section.error() {
        ui.horizontal(|ui| {
            ui.label(RichText::new(error).color(theme.danger));
            if ui.add(theme.button("Retry")).clicked() {
                actions.push(Action::ReloadComments);
            }
        });
    } else if section.tree().is_empty() {
        muted(ui, theme, "No comments yet. Be the first!");
    }

    for node in section.tree() {
        render_comment(
            ui,
            theme,
            text,
            node,
            0,
            view.reply_to.as_deref(),
            &mut view.reply_form,
            section.submitting(),
            actions,
        );
    }
}

fn comment_form(
    ui: &mut Ui,
    theme: &AppTheme,
    form: &mut CommentForm,
    parent_id: Option<&str>,
    submitting: bool,
    actions: &mut Vec<Action>,
) {
    let hint = if parent_id.is_some() { "Write a reply..." } else { "Write a comment..." };
    ui.add(
        egui::TextEdit::multiline(&mut form.content)
            .hint_text(hint)
            .desired_rows(3)
            .desired_width(f32::INFINITY),
    );
    let used = form.content.chars().count();
    let counter_color = if used > MAX_COMMENT_CHARS { theme.danger } else { theme.secondary_text };
    ui.label(RichText::new(format!("{}/{}", used, MAX_COMMENT_CHARS)).color(counter_color).size(12.0));

    ui.horizontal(|ui| {
        ui.add(
            egui::TextEdit::singleline(&mut form.author_name)
                .hint_text("Name")
                .char_limit(MAX_NAME_CHARS)
                .desired_width(160.0),
        );
        ui.add(
            egui::TextEdit::singleline(&mut form.author_email)
                .hint_text("Email")
                .char_limit(MAX_EMAIL_CHARS)
                .desired_width(220.0),
        );
        let label = match (submitting, parent_id.is_some()) {
            (true, _) => "Posting...",
            (false, true) => "Reply",
            (false, false) => "Post comment",
        };
        if ui.add_enabled(!submitting, theme.primary_button(label)).clicked() {
            actions.push(Action::SubmitComment {
                parent_id: parent_id.map(str::to_string),
            });
        }
        if parent_id.is_some() && ui.add(theme.button("Cancel")).clicked() {
            actions.push(Action::CancelReply);
        }
    });
}

fn avatar(ui: &mut Ui, name: &str, email: &str) {
    let (rect, _) = ui.allocate_exact_size(egui::vec2(28.0, 28.0), egui::Sense::hover());
    ui.painter().circle_filled(rect.center(), 14.0, display::avatar_color(email));
    ui.painter().text(
        rect.center(),
        egui::Align2::CENTER_CENTER,
        display::initial(name),
        egui::FontId::proportional(14.0),
        Color32::WHITE,
    );
}

#[allow(clippy::too_many_arguments)]
fn render_comment(
    ui: &mut Ui,
    theme: &AppTheme,
    text: &mut TextCache,
    node: &CommentNode,
    depth: usize,
    reply_to: Option<&str>,
    reply_form: &mut CommentForm,
    submitting: bool,
    actions: &mut Vec<Action>,
) {
    let record = &node.record;
    egui::Frame::new()
        .fill(theme.comment_background(depth))
        .corner_radius(egui::CornerRadius::same(6))
        .stroke(egui::Stroke::new(1.0, theme.separator))
        .inner_margin(10.0)
        .outer_margin(egui::vec2(8.0, 4.0))
        .show(ui, |ui| {
            ui.horizontal(|ui| {
                // Deep threads stop indenting so text keeps a usable width.
                ui.add_space((depth.min(6) * 16) as f32);
                ui.vertical(|ui| {
                    ui.horizontal(|ui| {
                        avatar(ui, &record.author_name, &record.author_email);
                        ui.label(RichText::new(&record.author_name).color(theme.accent).strong().size(14.0));
                        ui.add_space(8.0);
                        ui.label(
                            RichText::new(display::relative_time(record.created_at, Utc::now()))
                                .color(theme.secondary_text)
                                .size(13.0),
                        );
                    });
                    ui.add_space(4.0);
                    ui.label(RichText::new(text.comment(&record.content)).color(theme.text).size(15.0));

                    if reply_to == Some(record.id.as_str()) {
                        ui.add_space(6.0);
                        comment_form(ui, theme, reply_form, Some(&record.id), submitting, actions);
                    } else {
                        let descendants = node.descendant_count();
                        if descendants > 0 {
                            ui.label(
                                RichText::new(format!("{} {}", descendants, if descendants == 1 { "reply" } else { "replies" }))
                                    .color(theme.secondary_text)
                                    .italics()
                                    .size(13.0),
                            );
                        }
                        let reply = ui.add(
                            egui::Button::new(RichText::new("Reply").color(theme.highlight).size(13.0))
                                .small()
                                .frame(false),
                        );
                        if reply.clicked() {
                            actions.push(Action::Reply(record.id.clone()));
                        }
                    }

                    if !node.replies.is_empty() {
                        ui.add_space(6.0);
                        for child in &node.replies {
                            render_comment(ui, theme, text, child, depth + 1, reply_to, reply_form, submitting, actions);
                        }
                    }
                });
            });
        });
}
