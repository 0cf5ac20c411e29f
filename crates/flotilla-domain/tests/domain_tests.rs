use flotilla_domain::deployment::DEPLOY_IN_PROGRESS;
use flotilla_domain::formation::validate_processes;
use flotilla_domain::{App, DeploymentStrategy, DomainError, JobState, ProcessType, Processes, Release, DEFAULT_DEPLOY_TIMEOUT};

#[test]
fn app_body_decodes_with_defaults() {
    // El cuerpo mínimo de POST /apps sólo lleva el nombre
    let app: App = serde_json::from_str(r#"{"name":"foo"}"#).unwrap();
    assert_eq!(app.name, "foo");
    assert_eq!(app.strategy, DeploymentStrategy::AllAtOnce);
    assert_eq!(app.deploy_timeout, DEFAULT_DEPLOY_TIMEOUT);
    assert!(app.id.is_nil());
    assert!(app.validate().is_ok());
}

#[test]
fn unknown_strategy_fails_to_decode() {
    let res: Result<App, _> = serde_json::from_str(r#"{"name":"foo","strategy":"blue-green"}"#);
    assert!(res.is_err());
}

#[test]
fn formation_processes_must_exist_in_release() {
    let mut release = Release::default();
    release.processes.insert("web".into(), ProcessType::default());
    let mut ok = Processes::new();
    ok.insert("web".into(), 3);
    assert!(validate_processes(&release, &ok).is_ok());

    let mut bad = ok.clone();
    bad.insert("worker".into(), 1);
    assert!(matches!(validate_processes(&release, &bad), Err(DomainError::Validation { .. })));
}

#[test]
fn job_state_order_is_total_up_to_terminal() {
    let order = [JobState::Pending, JobState::Starting, JobState::Up, JobState::Stopping, JobState::Down];
    for w in order.windows(2) {
        assert!(w[0].can_transition_to(w[1]));
        assert!(!w[1].can_transition_to(w[0]));
    }
}

#[test]
fn in_progress_message_is_stable() {
    let err = DomainError::conflict(DEPLOY_IN_PROGRESS);
    assert_eq!(err.to_string(), "Cannot create deploy, there is already one in progress for this app.");
}
