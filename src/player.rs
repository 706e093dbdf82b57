use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use tracing::{debug, warn};

use crate::model::Video;

const URL_PLACEHOLDER: &str = "%URL%";
const TITLE_PLACEHOLDER: &str = "%TITLE%";

/// Plays the active feed item. At most one video plays at a time; starting
/// another one stops the current one first.
pub trait Player {
    fn start(&mut self, video: &Video) -> Result<()>;
    fn stop(&mut self);
    fn now_playing(&self) -> Option<&str>;

    /// Reports a player that exited on its own since the last call.
    fn poll_exit(&mut self) -> Option<Result<ExitStatus>> {
        None
    }
}

/// Keeps track of what would play without launching anything.
#[derive(Debug, Default)]
pub struct NullPlayer {
    current: Option<String>,
}

impl Player for NullPlayer {
    fn start(&mut self, video: &Video) -> Result<()> {
        self.current = Some(video.id.clone());
        Ok(())
    }

    fn stop(&mut self) {
        self.current = None;
    }

    fn now_playing(&self) -> Option<&str> {
        self.current.as_deref()
    }
}

struct PlaybackSession {
    video_id: String,
    kill_tx: Sender<()>,
    status_rx: Receiver<Result<ExitStatus>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl PlaybackSession {
    fn finalize(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    fn try_status(&mut self) -> Option<Result<ExitStatus>> {
        match self.status_rx.try_recv() {
            Ok(res) => {
                self.finalize();
                Some(res)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.finalize();
                Some(Err(anyhow!("player closed unexpectedly")))
            }
        }
    }

    fn stop_blocking(&mut self) -> Option<Result<ExitStatus>> {
        if self.handle.is_none() {
            return None;
        }
        let _ = self.kill_tx.send(());
        let res = self.status_rx.recv().ok();
        self.finalize();
        res
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        self.stop_blocking();
    }
}

/// Runs an external command (mpv by default) for the active video.
pub struct CommandPlayer {
    command: Vec<String>,
    session: Option<PlaybackSession>,
}

impl CommandPlayer {
    pub fn new(command: Vec<String>) -> Result<Self> {
        anyhow::ensure!(
            command.first().is_some_and(|program| !program.trim().is_empty()),
            "player: video command is empty"
        );
        Ok(Self {
            command,
            session: None,
        })
    }

    /// Program arguments for `video`. The URL is appended when the command
    /// has no `%URL%` placeholder.
    pub fn arguments(&self, video: &Video) -> Vec<String> {
        let mut args: Vec<String> = self
            .command
            .iter()
            .skip(1)
            .map(|arg| {
                arg.replace(URL_PLACEHOLDER, &video.url)
                    .replace(TITLE_PLACEHOLDER, &video.title)
            })
            .collect();
        if !self.command.iter().any(|arg| arg.contains(URL_PLACEHOLDER)) {
            args.push(video.url.clone());
        }
        args
    }
}

impl Player for CommandPlayer {
    fn start(&mut self, video: &Video) -> Result<()> {
        if video.url.trim().is_empty() {
            return Err(anyhow!("video {} has no media url", video.id));
        }
        self.stop();

        let program = self.command[0].clone();
        let args = self.arguments(video);
        debug!(program = %program, video = %video.id, "starting player");

        let mut child = Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("launch {program} to play {}", video.url))?;

        let (kill_tx, kill_rx) = bounded::<()>(1);
        let (status_tx, status_rx) = bounded::<Result<ExitStatus>>(1);
        let handle = thread::spawn(move || {
            let result = (|| -> Result<ExitStatus> {
                loop {
                    if kill_rx.try_recv().is_ok() {
                        let _ = child.kill();
                        return child.wait().context("wait for player after stop request");
                    }
                    match child.try_wait() {
                        Ok(Some(status)) => return Ok(status),
                        Ok(None) => thread::sleep(Duration::from_millis(30)),
                        Err(err) => return Err(anyhow!(err)).context("poll player status"),
                    }
                }
            })();
            let _ = status_tx.send(result);
        });

        self.session = Some(PlaybackSession {
            video_id: video.id.clone(),
            kill_tx,
            status_rx,
            handle: Some(handle),
        });
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(mut session) = self.session.take() {
            debug!(video = %session.video_id, "stopping player");
            if let Some(Err(err)) = session.stop_blocking() {
                warn!(error = %format!("{err:#}"), "player did not stop cleanly");
            }
        }
    }

    fn now_playing(&self) -> Option<&str> {
        self.session.as_ref().map(|session| session.video_id.as_str())
    }

    fn poll_exit(&mut self) -> Option<Result<ExitStatus>> {
        let status = self.session.as_mut()?.try_status()?;
        self.session = None;
        Some(status)
    }
}

impl Drop for CommandPlayer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video() -> Video {
        serde_json::from_value(serde_json::json!({
            "_id": "v1",
            "title": "Feijoada",
            "url": "https://cdn.example.com/v1.mp4",
        }))
        .unwrap()
    }

    #[test]
    fn placeholders_are_substituted() {
        let player = CommandPlayer::new(vec![
            "mpv".into(),
            "--loop-file=inf".into(),
            "--title=%TITLE%".into(),
            "%URL%".into(),
        ])
        .unwrap();
        assert_eq!(
            player.arguments(&video()),
            vec![
                "--loop-file=inf".to_string(),
                "--title=Feijoada".to_string(),
                "https://cdn.example.com/v1.mp4".to_string(),
            ]
        );
    }

    #[test]
    fn url_is_appended_without_placeholder() {
        let player = CommandPlayer::new(vec!["vlc".into()]).unwrap();
        assert_eq!(
            player.arguments(&video()),
            vec!["https://cdn.example.com/v1.mp4".to_string()]
        );
    }

    #[test]
    fn empty_command_is_rejected() {
        assert!(CommandPlayer::new(Vec::new()).is_err());
        assert!(CommandPlayer::new(vec![" ".into()]).is_err());
    }

    #[test]
    fn null_player_tracks_current_video() {
        let mut player = NullPlayer::default();
        player.start(&video()).unwrap();
        assert_eq!(player.now_playing(), Some("v1"));
        player.stop();
        assert_eq!(player.now_playing(), None);
    }

    #[cfg(unix)]
    #[test]
    fn stop_kills_running_command() {
        let mut player = CommandPlayer::new(vec![
            "sh".into(),
            "-c".into(),
            "sleep 30".into(),
            "player".into(),
            "%URL%".into(),
        ])
        .unwrap();
        player.start(&video()).unwrap();
        assert_eq!(player.now_playing(), Some("v1"));
        assert!(player.poll_exit().is_none());

        let started = std::time::Instant::now();
        player.stop();
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(player.now_playing(), None);
    }

    #[cfg(unix)]
    #[test]
    fn poll_exit_reports_finished_command() {
        let mut player =
            CommandPlayer::new(vec!["sh".into(), "-c".into(), "exit 0".into()]).unwrap();
        player.start(&video()).unwrap();
        let mut status = None;
        for _ in 0..200 {
            status = player.poll_exit();
            if status.is_some() {
                break;
            }
            thread::sleep(Duration::from_millis(20));
        }
        assert!(status.unwrap().unwrap().success());
        assert_eq!(player.now_playing(), None);
    }
}
