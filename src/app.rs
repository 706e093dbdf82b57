use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::api;
use crate::cli::{Command, Invocation};
use crate::config::{self, Config};
use crate::data::{SampleBackend, Services};
use crate::logging;
use crate::model::ProfileUpdate;
use crate::player::{CommandPlayer, NullPlayer, Player};
use crate::profile;
use crate::session::Session;
use crate::storage;
use crate::task::{Executor, ThreadExecutor};
use crate::ui;
use crate::upload::{UploadStage, Uploader};

struct AppContext {
    config: Config,
    session: Arc<Session>,
    services: Services,
    offline: bool,
}

pub fn run(invocation: Invocation) -> Result<()> {
    let cfg = config::load(config::LoadOptions {
        config_file: invocation.config_file.clone(),
        env_prefix: None,
    })
    .context("load config")?;
    logging::init(&cfg.logging);
    info!(version = crate::VERSION, offline = invocation.offline, "starting");

    let ctx = context(cfg, invocation.offline)?;
    match invocation.command {
        Command::Browse => browse(ctx, ui::StartScreen::Home),
        Command::Video(video_id) => browse(ctx, ui::StartScreen::Video(video_id)),
        Command::Profile(user_id) => browse(ctx, ui::StartScreen::Profile(user_id)),
        Command::Login(user_id) => {
            let user = ctx.session.sign_in(ctx.services.users.as_ref(), &user_id)?;
            println!("Signed in as @{} ({}).", user.handle, user.id);
            Ok(())
        }
        Command::Logout => {
            ctx.session.sign_out()?;
            println!("Signed out.");
            Ok(())
        }
        Command::WhoAmI => {
            match ctx.session.current_user() {
                Some(user) => println!("@{} ({}) {}", user.handle, user.id, user.display_name()),
                None => println!("Not signed in."),
            }
            Ok(())
        }
        Command::SignUp(form) => {
            let today = chrono::Local::now().date_naive();
            let user = ctx
                .session
                .sign_up(ctx.services.users.as_ref(), &form, today)?;
            println!("Welcome, @{}! You are signed in.", user.handle);
            Ok(())
        }
        Command::Upload(draft) => upload(&ctx, &draft),
        Command::EditProfile { name, handle } => {
            let Some(current) = ctx.session.current_user() else {
                bail!("sign in first (irecipes-tui login <user-id>)");
            };
            let update = ProfileUpdate {
                name: name.unwrap_or(current.name),
                handle: handle.unwrap_or(current.handle),
            };
            let user = profile::edit_profile(&ctx.session, ctx.services.users.as_ref(), &update)?;
            println!("Profile saved: {} (@{}).", user.display_name(), user.handle);
            Ok(())
        }
        Command::Avatar(path) => {
            profile::upload_profile_image(&ctx.session, ctx.services.users.as_ref(), &path)?;
            println!("Profile picture updated.");
            Ok(())
        }
        Command::Version | Command::Help => Ok(()),
    }
}

fn context(config: Config, offline: bool) -> Result<AppContext> {
    if offline {
        let backend = Arc::new(SampleBackend::new());
        return Ok(AppContext {
            config,
            session: Arc::new(Session::ephemeral()),
            services: Services::sample(backend),
            offline,
        });
    }

    let store =
        Arc::new(storage::Store::open(storage::Options::default()).context("open storage")?);
    let session = Arc::new(Session::new(store).context("restore session")?);
    let client = api::Client::new(api::ClientConfig {
        base_url: Some(config.api.base_url.clone()),
        user_agent: config.api.user_agent.clone(),
        timeout: Some(config.api.timeout),
        http_client: None,
    })
    .context("create API client")?;
    Ok(AppContext {
        config,
        session,
        services: Services::api(Arc::new(client)),
        offline,
    })
}

fn browse(ctx: AppContext, start: ui::StartScreen) -> Result<()> {
    let player: Box<dyn Player> = if ctx.config.player.enabled {
        match CommandPlayer::new(ctx.config.player.video_command.clone()) {
            Ok(player) => Box::new(player),
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "player disabled");
                Box::new(NullPlayer::default())
            }
        }
    } else {
        Box::new(NullPlayer::default())
    };

    let status_message = match (ctx.offline, ctx.session.current_user()) {
        (true, _) => "Offline sample recipes. Press L and sign in as sample-user-1 to interact."
            .to_string(),
        (false, Some(user)) => format!("Welcome back, @{}.", user.handle),
        (false, None) => "Browsing as guest. Press L to sign in.".to_string(),
    };

    let executor: Arc<dyn Executor> = Arc::new(ThreadExecutor);
    let options = ui::Options {
        status_message,
        services: ctx.services,
        session: ctx.session,
        executor,
        settings: ctx.config.feed.settings(),
        player,
        start,
    };

    let mut model = ui::Model::new(options);
    model.run()
}

fn upload(ctx: &AppContext, draft: &crate::upload::VideoDraft) -> Result<()> {
    let Some(service) = ctx.services.uploads.clone() else {
        bail!("uploads are not available offline");
    };
    let user_id = ctx
        .session
        .require_user_id()
        .context("sign in first (irecipes-tui login <user-id>)")?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(Duration::from_millis(120));

    let uploader = Uploader::new(service, ctx.config.upload.bucket.clone());
    let file_name = display_name(&draft.path);
    let result = uploader.upload(draft, &user_id, |stage| {
        let message = match stage {
            UploadStage::RequestingUrl => "Requesting upload URL…".to_string(),
            UploadStage::Uploading { bytes } => {
                format!("Uploading {file_name} ({})…", human_bytes(bytes))
            }
            UploadStage::Publishing => "Publishing…".to_string(),
        };
        spinner.set_message(message);
    });

    match result {
        Ok(url) => {
            spinner.finish_with_message(format!("Published {url}"));
            Ok(())
        }
        Err(err) => {
            spinner.abandon_with_message("Upload failed");
            Err(err)
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn human_bytes(bytes: usize) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
