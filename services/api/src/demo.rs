use crate::infra::{session_settings, spawn_session_driver};
use applyflow::config::AppConfig;
use applyflow::error::AppError;
use applyflow::workflows::onboarding::{
    CandidateField, CandidateRecord, ChatConfig, ChatMessage, Sender, SessionDriver,
    SessionSettings, SessionSnapshot, Stage, StageTimings, StageTransition,
};
use clap::Args;
use std::time::Duration;

const FAST_STAGE_STEP: Duration = Duration::from_millis(250);
const FAST_REPLY_DELAY: Duration = Duration::from_millis(150);

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Shorten every timer so the walkthrough finishes in about a second.
    #[arg(long)]
    pub(crate) fast: bool,
    /// Message to send to the assistant while the profile is under review.
    #[arg(long)]
    pub(crate) message: Option<String>,
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs { fast, message } = args;

    let settings = if fast {
        fast_settings()
    } else {
        session_settings(&AppConfig::load()?.workflow)
    };
    let poll_every = poll_interval(&settings.stage_timings);
    let driver = spawn_session_driver(settings);

    println!("Application workflow demo");
    let snapshot = walk_through(&driver, message, poll_every).await?;

    println!("\nChat log");
    for message in &snapshot.messages {
        print_message(message);
    }

    if let Some(code) = &snapshot.tracking_code {
        println!(
            "\nProcess {} completed with tracking code {}",
            snapshot.process_id, code
        );
    }
    Ok(())
}

/// Drive one candidate from the empty form to completion, echoing each stage change.
async fn walk_through(
    driver: &SessionDriver,
    message: Option<String>,
    poll_every: Duration,
) -> Result<SessionSnapshot, AppError> {
    let opening = driver.snapshot().await;
    println!(
        "- Process {} opened in the {} stage",
        opening.process_id,
        opening.stage.label()
    );

    let candidate = demo_candidate();
    for field in CandidateField::ordered() {
        let value = candidate.value(field).to_string();
        driver
            .with_session(|session, _| session.update_candidate(field, &value))
            .await?;
    }
    let draft = driver.snapshot().await.candidate;
    println!("- Form filled for {} ({})", draft.name, draft.national_id);

    driver
        .with_session(|session, now| session.submit_draft(now))
        .await?;
    println!("- Submitted; review timers running");

    let awaiting_reply = match message {
        Some(text) => {
            driver
                .with_session(|session, now| session.send_user_message(&text, now))
                .await?;
            println!("- Asked the assistant: {text}");
            true
        }
        None => false,
    };

    let mut printed = 0;
    loop {
        tokio::time::sleep(poll_every).await;
        let snapshot = driver.snapshot().await;
        for transition in &snapshot.transitions[printed..] {
            print_transition(transition);
        }
        printed = snapshot.transitions.len();

        let replied = !awaiting_reply
            || snapshot
                .messages
                .last()
                .is_some_and(|message| message.sender == Sender::Assistant);
        if snapshot.stage == Stage::Approved && replied {
            break;
        }
    }

    driver
        .with_session(|session, _| session.request_contract_authorization())
        .await?;
    println!("- Contract authorization prompt opened");

    driver
        .with_session(|session, now| session.confirm_contract(now))
        .await?;
    driver
        .with_session(|session, now| session.confirm_payment(now).cloned())
        .await?;

    let snapshot = driver.snapshot().await;
    for transition in &snapshot.transitions[printed..] {
        print_transition(transition);
    }
    Ok(snapshot)
}

fn print_transition(transition: &StageTransition) {
    let via = transition
        .via
        .map(|stage| format!(" via {}", stage.label()))
        .unwrap_or_default();
    println!(
        "  {} -> {}{} ({:?}, {})",
        transition.from.label(),
        transition.to.label(),
        via,
        transition.trigger,
        transition.at.format("%H:%M:%S%.3f")
    );
}

fn print_message(message: &ChatMessage) {
    let who = match message.sender {
        Sender::User => "you",
        Sender::Assistant => "assistant",
    };
    println!("  [{}] {}: {}", message.id.0, who, message.body);
}

fn fast_settings() -> SessionSettings {
    SessionSettings {
        stage_timings: StageTimings::evenly_spaced(FAST_STAGE_STEP),
        chat: ChatConfig {
            reply_delay: FAST_REPLY_DELAY,
        },
        ..SessionSettings::default()
    }
}

fn poll_interval(timings: &StageTimings) -> Duration {
    (timings.profile_review() / 4).max(Duration::from_millis(10))
}

fn demo_candidate() -> CandidateRecord {
    CandidateRecord {
        name: "Marina Lopes".to_string(),
        national_id: "39053344705".to_string(),
        email: "marina.lopes@example.com".to_string(),
        phone: "+55 11 97777-2020".to_string(),
        address: "Avenida Paulista 1000, Sao Paulo".to_string(),
        prior_experience: Some("Three years handling support tickets remotely".to_string()),
        motivation_text: "I enjoy helping customers solve problems over chat and phone, \
            I keep a quiet home office with a stable connection, I already work with \
            ticketing tools every day, and I would like a flexible remote role where \
            I can keep learning new products while supporting a growing team."
            .to_string(),
    }
}
