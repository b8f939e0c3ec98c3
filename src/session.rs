//! Session loop.
//!
//! A [`QuestSession`] owns the tracker and is the only place it is mutated.
//! Commands, fired timers and reward confirmations all arrive over channels
//! and are applied one at a time on the session task.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::data::{DailyGoal, MainGoal};
use crate::profile::ProfileStore;
use crate::quest::{NotificationCategory, PendingReward, QuestTracker, RewardResponse, RewardService};
use crate::schedule::TimerId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    UpdateDailyGoal { goal: DailyGoal, amount: i32 },
    UpdateMainGoal { goal: MainGoal, amount: i32 },
    CollectDaily(String),
    CollectMain(String),
    CollectLogin,
    AdvanceEnergy,
    TryReset,
    /// Log a summary of the current quest state
    Status,
    Shutdown,
}

impl SessionCommand {
    /// Parse a console line, e.g. `daily win_battle 2` or `collect main first_steps`
    pub fn parse(line: &str) -> Result<Self, String> {
        let parts: Vec<&str> = line.split_whitespace().collect();

        match parts.as_slice() {
            ["daily", goal, rest @ ..] => {
                let goal = DailyGoal::from_str(goal)
                    .ok_or_else(|| format!("Unknown daily goal '{}'", goal))?;
                Ok(SessionCommand::UpdateDailyGoal { goal, amount: parse_amount(rest)? })
            }
            ["main", goal, rest @ ..] => {
                let goal = MainGoal::from_str(goal)
                    .ok_or_else(|| format!("Unknown main goal '{}'", goal))?;
                Ok(SessionCommand::UpdateMainGoal { goal, amount: parse_amount(rest)? })
            }
            ["collect", "daily", id] => Ok(SessionCommand::CollectDaily(id.to_string())),
            ["collect", "main", id] => Ok(SessionCommand::CollectMain(id.to_string())),
            ["collect", "login"] => Ok(SessionCommand::CollectLogin),
            ["energy"] => Ok(SessionCommand::AdvanceEnergy),
            ["reset"] => Ok(SessionCommand::TryReset),
            ["status"] => Ok(SessionCommand::Status),
            ["quit"] | ["exit"] => Ok(SessionCommand::Shutdown),
            [] => Err("Empty command".to_string()),
            _ => Err(format!("Unknown command '{}'", line.trim())),
        }
    }
}

fn parse_amount(rest: &[&str]) -> Result<i32, String> {
    match rest {
        [] => Ok(1),
        [amount] => amount
            .parse()
            .map_err(|e| format!("Invalid amount '{}': {}", amount, e)),
        _ => Err("Too many arguments".to_string()),
    }
}

/// Cloneable sender side of a running session
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<SessionCommand>,
}

impl SessionHandle {
    pub fn send(&self, command: SessionCommand) -> Result<(), String> {
        self.commands
            .send(command)
            .map_err(|_| "Session has stopped".to_string())
    }

    pub fn shutdown(&self) {
        let _ = self.commands.send(SessionCommand::Shutdown);
    }
}

type Confirmation = (PendingReward, Result<RewardResponse, String>);

enum Wake {
    Confirmed(Confirmation),
    Timer(TimerId),
    Command(Option<SessionCommand>),
}

pub struct QuestSession<P: ProfileStore + 'static, S: RewardService> {
    tracker: QuestTracker<P>,
    service: Arc<S>,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    timers: mpsc::UnboundedReceiver<TimerId>,
    confirm_tx: mpsc::UnboundedSender<Confirmation>,
    confirm_rx: mpsc::UnboundedReceiver<Confirmation>,
    in_flight: usize,
}

impl<P: ProfileStore + 'static, S: RewardService> QuestSession<P, S> {
    /// `timers` receives the ids fired by the tracker's scheduler
    pub fn new(
        tracker: QuestTracker<P>,
        service: Arc<S>,
        timers: mpsc::UnboundedReceiver<TimerId>,
    ) -> (Self, SessionHandle) {
        let (command_tx, commands) = mpsc::unbounded_channel();
        let (confirm_tx, confirm_rx) = mpsc::unbounded_channel();

        let session = Self {
            tracker,
            service,
            commands,
            timers,
            confirm_tx,
            confirm_rx,
            in_flight: 0,
        };
        (session, SessionHandle { commands: command_tx })
    }

    /// Run until shutdown or until every handle is dropped. Outstanding
    /// reward requests are awaited before the tracker is handed back.
    pub async fn run(mut self) -> QuestTracker<P> {
        info!("Quest session started");

        loop {
            // Confirmations and timers are applied before newer commands
            let wake = tokio::select! {
                biased;
                Some(confirmation) = self.confirm_rx.recv() => Wake::Confirmed(confirmation),
                Some(id) = self.timers.recv() => Wake::Timer(id),
                command = self.commands.recv() => Wake::Command(command),
            };

            match wake {
                Wake::Confirmed((pending, result)) => self.confirm(pending, result),
                Wake::Timer(id) => self.tracker.on_timer_fired(id),
                Wake::Command(Some(SessionCommand::Shutdown)) | Wake::Command(None) => break,
                Wake::Command(Some(command)) => self.handle_command(command),
            }
        }

        if self.in_flight > 0 {
            info!("Waiting for {} reward confirmation(s)", self.in_flight);
        }
        while self.in_flight > 0 {
            match self.confirm_rx.recv().await {
                Some((pending, result)) => self.confirm(pending, result),
                None => break,
            }
        }

        info!("Quest session stopped");
        self.tracker
    }

    fn handle_command(&mut self, command: SessionCommand) {
        debug!("Session command: {:?}", command);

        match command {
            SessionCommand::UpdateDailyGoal { goal, amount } => {
                self.tracker.update_daily_goal(goal, amount);
            }
            SessionCommand::UpdateMainGoal { goal, amount } => {
                self.tracker.update_main_goal(goal, amount);
            }
            SessionCommand::CollectDaily(id) => {
                let result = self.tracker.collect_daily_reward(&id);
                self.dispatch(result);
            }
            SessionCommand::CollectMain(id) => {
                let result = self.tracker.collect_main_reward(&id);
                self.dispatch(result);
            }
            SessionCommand::CollectLogin => {
                let result = self.tracker.collect_login_reward();
                self.dispatch(result);
            }
            SessionCommand::AdvanceEnergy => {
                let result = self.tracker.advance_energy();
                self.dispatch(result);
            }
            SessionCommand::TryReset => {
                if !self.tracker.try_reset_daily() {
                    info!("No reset due, {} until refresh", self.tracker.time_to_refresh());
                }
            }
            SessionCommand::Status => self.log_status(),
            SessionCommand::Shutdown => {}
        }
    }

    /// Send the confirmation request for a locally applied reward
    fn dispatch(&mut self, result: Result<PendingReward, String>) {
        let pending = match result {
            Ok(pending) => pending,
            Err(e) => {
                warn!("Reward not collected: {}", e);
                return;
            }
        };

        let service = Arc::clone(&self.service);
        let tx = self.confirm_tx.clone();
        self.in_flight += 1;

        tokio::spawn(async move {
            let response = service.request_reward(pending.request.clone()).await;
            let _ = tx.send((pending, response));
        });
    }

    fn confirm(&mut self, pending: PendingReward, result: Result<RewardResponse, String>) {
        self.in_flight = self.in_flight.saturating_sub(1);
        self.tracker.confirm_reward(pending, result);
    }

    fn log_status(&self) {
        let tracker = &self.tracker;
        info!(
            "Level {}, next reset in {}",
            tracker.profile().level(),
            tracker.time_to_refresh()
        );
        for quest in tracker.daily_quests() {
            info!(
                "  daily {} [{}] {}/{}{}",
                quest.id(),
                quest.goal().as_str(),
                quest.progress,
                quest.def.target,
                if quest.is_rewarded { " (rewarded)" } else { "" }
            );
        }
        for quest in tracker.main_quests() {
            info!(
                "  main {} [{}] {}/{}",
                quest.id(),
                quest.goal().as_str(),
                quest.progress,
                quest.def.target
            );
        }
        if let Some(energy) = tracker.daily_energy() {
            info!("  energy step {}", energy.current_step);
        }
        for category in NotificationCategory::ALL {
            info!("  {} pending: {}", category.as_str(), tracker.notification(category));
        }
    }
}
