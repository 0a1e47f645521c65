#[path = "adversarial/tampered_evidence.rs"]
mod tampered_evidence;

#[path = "adversarial/evidence_path_failure.rs"]
mod evidence_path_failure;

#[path = "adversarial/hostile_signals.rs"]
mod hostile_signals;

#[path = "adversarial/repeat_caller.rs"]
mod repeat_caller;
