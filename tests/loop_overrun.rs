use playhead::{Command, Easing, LoopCommand, ModifyCommand, Property, SpriteState, TimeMs};

fn spin(t0: i32, t1: i32) -> Command {
    Command::Modify(ModifyCommand {
        property: Property::Rotation,
        easing: Easing::Linear,
        start_time: TimeMs(t0),
        end_time: TimeMs(t1),
        start_values: vec![0.0],
        end_values: vec![1.0],
    })
}

#[test]
fn overrun_is_logged_and_execution_continues() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();

    // Two declared iterations end at 200; a clock at 250 lands on the
    // implied third, which still evaluates normally.
    let mut lp = LoopCommand::new(TimeMs(0), 2, vec![spin(0, 100)]);
    let mut state = SpriteState::default();
    lp.update(TimeMs(250), &mut state);

    assert_eq!(lp.current_iteration(), Some(2));
    assert!((state.rotation - 0.5).abs() < 1e-6);
}
