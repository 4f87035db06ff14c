use taskweave::types::{
    parse_phase, parse_phase_set, AttemptLimit, Phase, PhaseSet, TaskStatus,
};

#[test]
fn status_round_trips_through_strings() {
    for status in TaskStatus::ALL {
        assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), status);
    }
    assert_eq!(" Running ".parse::<TaskStatus>().unwrap(), TaskStatus::Running);
    assert!("done".parse::<TaskStatus>().is_err());
}

#[test]
fn terminal_statuses() {
    assert!(TaskStatus::Completed.is_terminal());
    assert!(TaskStatus::Failed.is_terminal());
    assert!(!TaskStatus::Pending.is_terminal());
    assert!(!TaskStatus::Running.is_terminal());
}

#[test]
fn phase_aliases_parse() {
    assert_eq!(parse_phase("Planning").unwrap(), Phase::Plan);
    assert_eq!(parse_phase("impl").unwrap(), Phase::Implement);
    assert!(parse_phase("deploy").is_err());
}

#[test]
fn phase_set_parses_comma_lists() {
    let set = parse_phase_set("review, plan").unwrap();
    assert_eq!(set.phases(), vec![Phase::Plan, Phase::Review]);
    assert_eq!(set.to_string(), "plan,review");
    assert!(!set.is_planning_only());

    assert!(parse_phase_set("plan").unwrap().is_planning_only());
    assert!(parse_phase_set(" , ").is_err());
    assert!(parse_phase_set("plan,ship").is_err());
}

#[test]
fn empty_phase_set() {
    let set = PhaseSet::only(&[]);
    assert!(set.is_empty());
    assert!(!PhaseSet::all().is_empty());
}

#[test]
fn attempt_limits() {
    let bounded = AttemptLimit::Bounded(3);
    assert!(bounded.allows(3));
    assert!(!bounded.allows(4));
    assert!(AttemptLimit::Unbounded.allows(u32::MAX));
    assert_eq!(AttemptLimit::default(), AttemptLimit::Bounded(20));
    assert_eq!(AttemptLimit::Unbounded.to_string(), "unbounded");
}
