//! End-to-end progression scenarios through `TerminalService`.
//!
//! Each test builds a temp-dir workspace (catalog + JSON stores) over the
//! in-process runtime double and drives learners through a track.

use std::sync::Arc;

use sandbox_engine::core::types::{EnvState, LearnerId, Progress};
use sandbox_engine::io::runtime::ExecOutput;
use sandbox_engine::test_support::{FakeRuntime, RuntimeCall, TestWorkspace, lesson};

fn setup(lessons: Vec<sandbox_engine::io::catalog::Lesson>) -> (TestWorkspace, Arc<FakeRuntime>) {
    let runtime = Arc::new(FakeRuntime::new());
    let ws = TestWorkspace::new(lessons, runtime.clone()).expect("workspace");
    ws.register("1").expect("register");
    (ws, runtime)
}

fn stdout(text: &str) -> ExecOutput {
    ExecOutput {
        exit_code: Some(0),
        stdout: text.to_string(),
        stderr: String::new(),
        timed_out: false,
    }
}

/// Track: `^pwd$` then `^ls(\s.*)?$`.
///
/// ```text
/// cursor 0: "ls -la" → fail, "pwd" → pass
/// cursor 1: "ls"     → pass (course complete)
/// cursor 2: "pwd"    → executes, passed:false, cursor stays 2
/// ```
#[test]
fn two_lesson_track_walkthrough() {
    let (ws, runtime) = setup(vec![
        lesson(1, 2, Some(r"^ls(\s.*)?$")),
        lesson(1, 1, Some("^pwd$")),
    ]);
    let service = ws.service();
    let learner = LearnerId::new("1");

    let out = service.execute_command(&learner, 1, "ls -la").expect("ls -la");
    assert!(!out.passed);
    assert_eq!(out.progress, Progress { current: 0, total: 2 });

    runtime.push_exec(Ok(stdout("/root\n")));
    let out = service.execute_command(&learner, 1, "pwd").expect("pwd");
    assert!(out.passed);
    assert_eq!(out.output, "/root\n");
    assert_eq!(out.progress.current, 1);

    let out = service.execute_command(&learner, 1, "ls").expect("ls");
    assert!(out.passed);
    assert_eq!(out.progress, Progress { current: 2, total: 2 });
    assert!(out.progress.is_complete());

    runtime.push_exec(Ok(stdout("/root\n")));
    let out = service.execute_command(&learner, 1, "pwd").expect("free play");
    assert!(!out.passed);
    assert_eq!(out.output, "/root\n");
    assert_eq!(out.progress.current, 2);
    assert_eq!(ws.stored_cursor("1", 1), Some(2));

    // One environment for the whole walkthrough.
    assert_eq!(runtime.count(|c| matches!(c, RuntimeCall::Create(_))), 1);
    assert_eq!(runtime.count(|c| matches!(c, RuntimeCall::Exec { .. })), 4);
}

#[test]
fn single_lesson_requires_an_argument() {
    let (ws, _) = setup(vec![lesson(3, 0, Some("^mkdir .+"))]);
    let service = ws.service();
    let learner = LearnerId::new("1");

    let out = service.execute_command(&learner, 3, "mkdir").expect("mkdir");
    assert!(!out.passed);
    assert_eq!(out.progress.current, 0);

    let out = service
        .execute_command(&learner, 3, "mkdir test")
        .expect("mkdir test");
    assert!(out.passed);
    assert_eq!(out.progress, Progress { current: 1, total: 1 });

    for input in ["mkdir again", "ls", "pwd"] {
        let out = service.execute_command(&learner, 3, input).expect(input);
        assert!(!out.passed, "{input} must not pass after completion");
        assert_eq!(out.progress.current, 1);
    }
}

/// A request that read cursor 0 finishes after two faster requests moved the
/// cursor to 2. Its pass is dropped and it reports the stored cursor.
#[test]
fn slow_pass_does_not_overwrite_newer_progress() {
    let (ws, runtime) = setup(vec![
        lesson(1, 1, Some("^ls")),
        lesson(1, 2, None),
        lesson(1, 3, None),
        lesson(1, 4, None),
    ]);
    let service = ws.service();
    let learner = LearnerId::new("1");
    runtime.hold_exec("ls slow");

    std::thread::scope(|scope| {
        let slow = scope.spawn(|| service.execute_command(&learner, 1, "ls slow"));
        runtime.wait_for_held_exec();

        let out = service.execute_command(&learner, 1, "ls").expect("ls");
        assert!(out.passed);
        assert_eq!(out.progress.current, 1);
        let out = service.execute_command(&learner, 1, "pwd").expect("pwd");
        assert!(out.passed);
        assert_eq!(out.progress.current, 2);

        runtime.release_exec();
        let out = slow.join().expect("slow thread").expect("slow request");
        assert!(!out.passed);
        assert_eq!(out.progress, Progress { current: 2, total: 4 });
    });
    assert_eq!(ws.stored_cursor("1", 1), Some(2));
}

#[test]
fn reset_during_slow_command_is_not_undone() {
    let (ws, runtime) = setup(vec![lesson(1, 1, None), lesson(1, 2, None), lesson(1, 3, None)]);
    let service = ws.service();
    let learner = LearnerId::new("1");
    service.execute_command(&learner, 1, "pwd").expect("first");
    runtime.hold_exec("ls -la");

    std::thread::scope(|scope| {
        let slow = scope.spawn(|| service.execute_command(&learner, 1, "ls -la"));
        runtime.wait_for_held_exec();

        service.reset_course(&learner, 1).expect("reset");

        runtime.release_exec();
        let out = slow.join().expect("slow thread").expect("slow request");
        assert!(!out.passed);
        assert_eq!(out.progress.current, 0);
    });
    assert_eq!(ws.stored_cursor("1", 1), Some(0));
}

#[test]
fn reset_from_complete_then_open_lesson_auto_passes() {
    let (ws, runtime) = setup(vec![lesson(1, 1, None), lesson(1, 2, None)]);
    let service = ws.service();
    let learner = LearnerId::new("1");

    service.execute_command(&learner, 1, "pwd").expect("first");
    service.execute_command(&learner, 1, "whoami").expect("second");
    assert_eq!(
        service.get_progress(&learner, 1).expect("progress"),
        Progress { current: 2, total: 2 }
    );

    let generation = runtime.generation("linux_user_1");
    service.reset_course(&learner, 1).expect("reset");
    assert_eq!(
        service.get_progress(&learner, 1).expect("progress"),
        Progress { current: 0, total: 2 }
    );
    assert!(runtime.generation("linux_user_1") > generation);

    let out = service.execute_command(&learner, 1, "date").expect("after reset");
    assert!(out.passed);
    assert_eq!(out.progress.current, 1);
}

#[test]
fn check_matches_input_case_insensitively() {
    let (ws, _) = setup(vec![lesson(1, 1, Some("^pwd$"))]);
    let out = ws
        .service()
        .execute_command(&LearnerId::new("1"), 1, "  PWD  ")
        .expect("execute");
    // The allow-list is case-sensitive; the lesson check is not.
    assert_eq!(out.output, "command \"PWD\" is not available in this course.");
    assert!(out.passed);
}

#[test]
fn blank_input_never_advances() {
    let (ws, runtime) = setup(vec![lesson(1, 1, None)]);
    let out = ws
        .service()
        .execute_command(&LearnerId::new("1"), 1, "   ")
        .expect("execute");
    assert_eq!(out.output, "empty command.");
    assert!(!out.passed);
    assert_eq!(runtime.count(|c| matches!(c, RuntimeCall::Exec { .. })), 0);
}

#[test]
fn dangerous_command_is_rejected_without_execution() {
    let (ws, runtime) = setup(vec![lesson(1, 1, Some("^pwd$"))]);
    let out = ws
        .service()
        .execute_command(&LearnerId::new("1"), 1, "echo hi; rm -rf /")
        .expect("execute");
    assert_eq!(out.output, "dangerous command.");
    assert!(!out.passed);
    assert_eq!(runtime.count(|c| matches!(c, RuntimeCall::Exec { .. })), 0);
}

#[test]
fn invalid_pattern_fails_closed_and_blocks_only_that_lesson() {
    let (ws, _) = setup(vec![
        lesson(1, 1, Some("^ls(")),
        lesson(2, 1, Some("^pwd$")),
    ]);
    let service = ws.service();
    let learner = LearnerId::new("1");

    let out = service.execute_command(&learner, 1, "ls(").expect("track 1");
    assert!(!out.passed);
    assert_eq!(out.progress.current, 0);

    let out = service.execute_command(&learner, 2, "pwd").expect("track 2");
    assert!(out.passed);
}

#[test]
fn tracks_progress_independently() {
    let (ws, _) = setup(vec![lesson(1, 1, None), lesson(2, 1, Some("^cd "))]);
    let service = ws.service();
    let learner = LearnerId::new("1");

    service.execute_command(&learner, 1, "ls").expect("track 1");
    let out = service.execute_command(&learner, 2, "ls").expect("track 2");
    assert!(!out.passed);

    assert_eq!(ws.stored_cursor("1", 1), Some(1));
    assert_eq!(ws.stored_cursor("1", 2), Some(0));
}

#[test]
fn learners_get_separate_environments() {
    let (ws, runtime) = setup(vec![lesson(1, 1, None)]);
    ws.register("2").expect("register 2");
    let service = ws.service();

    service
        .execute_command(&LearnerId::new("1"), 1, "pwd")
        .expect("learner 1");
    service
        .execute_command(&LearnerId::new("2"), 1, "pwd")
        .expect("learner 2");

    assert_eq!(runtime.state("linux_user_1"), Some(EnvState::Running));
    assert_eq!(runtime.state("linux_user_2"), Some(EnvState::Running));
    assert_eq!(service.lifecycle().known_count(), 2);
}

#[test]
fn stopped_environment_is_restarted_not_recreated() {
    let (ws, runtime) = setup(vec![lesson(1, 1, None)]);
    runtime.insert("linux_user_1", EnvState::Stopped);

    ws.service()
        .execute_command(&LearnerId::new("1"), 1, "pwd")
        .expect("execute");
    assert_eq!(runtime.count(|c| matches!(c, RuntimeCall::Start(_))), 1);
    assert_eq!(runtime.count(|c| matches!(c, RuntimeCall::Create(_))), 0);
}

#[test]
fn timed_out_command_reports_and_still_evaluates_input() {
    let (ws, runtime) = setup(vec![lesson(1, 1, Some("^find "))]);
    runtime.push_exec(Ok(ExecOutput {
        exit_code: None,
        stdout: String::new(),
        stderr: String::new(),
        timed_out: true,
    }));
    let out = ws
        .service()
        .execute_command(&LearnerId::new("1"), 1, "find / -name core")
        .expect("execute");
    assert_eq!(out.output, "command timed out after 3000ms");
    assert!(out.passed);
}

#[test]
fn lessons_returns_display_payload_in_order() {
    let (ws, _) = setup(vec![lesson(1, 2, Some("^ls")), lesson(1, 1, Some("^pwd$"))]);
    let lessons = ws.service().lessons(1).expect("lessons");
    let titles: Vec<&str> = lessons.iter().map(|l| l.title.as_str()).collect();
    assert_eq!(titles, vec!["lesson 1", "lesson 2"]);
    assert!(ws.service().lessons(9).unwrap_err().is_not_found());
}
