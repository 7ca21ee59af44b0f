mod common;
use anyhow::Result;
use common::*;
use giqn_core::{
    record::{BufferedRecorder, NullRecorder, Recorder},
    Agent as _, ReplayBufferBase,
};
use giqn_tch_agent::{
    iqn::{Freeze, IqnSample, TargetAction},
    model::ModelBase,
};
use std::rc::Rc;
use giqn_tensorboard::TensorboardRecorder;
use tempdir::TempDir;

#[test]
fn test_target_network_is_not_trained() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut agent = agent();
    let mut buffer = FixedBuffer::build(&FixedBufferConfig::default());
    let target_before = snapshot(agent.target().get_var_store());
    let online_before = snapshot(agent.online().get_var_store());
    assert!(same_values(&target_before, &online_before));

    for _ in 0..3 {
        agent.opt(&mut buffer)?;
        assert!(agent.target().is_frozen());
    }

    let target_after = snapshot(agent.target().get_var_store());
    let online_after = snapshot(agent.online().get_var_store());
    assert!(same_values(&target_before, &target_after));
    assert!(!same_values(&online_before, &online_after));

    agent.update_target()?;
    let target_synced = snapshot(agent.target().get_var_store());
    assert!(same_values(&online_after, &target_synced));
    assert!(agent.target().is_frozen());
    Ok(())
}

#[test]
fn test_target_update_interval() -> Result<()> {
    let config = config(TargetAction::Target, N_ACTIONS, BATCH_SIZE)
        .target_update_interval(Some(2));
    let mut agent = Agent::build(config, None)?;
    let mut buffer = FixedBuffer::build(&FixedBufferConfig::default());
    let mut recorder = NullRecorder::new();

    recorder.write(agent.opt_with_record(&mut buffer)?);
    let online = snapshot(agent.online().get_var_store());
    let target = snapshot(agent.target().get_var_store());
    assert!(!same_values(&online, &target));

    recorder.write(agent.opt_with_record(&mut buffer)?);
    let online = snapshot(agent.online().get_var_store());
    let target = snapshot(agent.target().get_var_store());
    assert!(same_values(&online, &target));
    Ok(())
}

#[test]
fn test_critic_is_updated_and_refrozen() -> Result<()> {
    let mut agent = agent();
    let mut buffer = FixedBuffer::build(&FixedBufferConfig::default());
    assert!(agent.critic().is_frozen());

    for _ in 0..3 {
        let before = snapshot(agent.critic().get_var_store());
        agent.opt(&mut buffer)?;
        let after = snapshot(agent.critic().get_var_store());
        assert!(!same_values(&before, &after));
        assert!(agent.critic().is_frozen());
    }
    Ok(())
}

#[test]
fn test_teacher_is_never_updated() -> Result<()> {
    let mut agent = agent();
    let mut buffer = FixedBuffer::build(&FixedBufferConfig::default());
    let teacher = agent.teacher().expect("teacher");
    let online = snapshot(teacher.online().get_var_store());
    let target = snapshot(teacher.target().get_var_store());
    let critic = snapshot(teacher.critic().get_var_store());

    for _ in 0..3 {
        agent.opt(&mut buffer)?;
    }

    let teacher = agent.teacher().expect("teacher");
    assert!(teacher.is_frozen());
    assert!(same_values(&online, &snapshot(teacher.online().get_var_store())));
    assert!(same_values(&target, &snapshot(teacher.target().get_var_store())));
    assert!(same_values(&critic, &snapshot(teacher.critic().get_var_store())));
    Ok(())
}

#[test]
fn test_telemetry_at_log_interval() -> Result<()> {
    let mut agent = agent();
    let mut buffer = FixedBuffer::build(&FixedBufferConfig::default());
    let mut recorder = BufferedRecorder::new();
    let dir = TempDir::new("gan_iqn_tensorboard")?;
    let mut tb_recorder = TensorboardRecorder::new(dir.path());

    for _ in 0..4 {
        let record = agent.opt_with_record(&mut buffer)?;
        recorder.write(record.clone());
        tb_recorder.write(record);
    }
    tb_recorder.flush();

    let records: Vec<_> = recorder.iter().collect();
    assert_eq!(records.len(), 4);
    for (i, record) in records.iter().enumerate() {
        let opt_steps = i + 1;
        assert_eq!(record.get_scalar("opt_steps")?, opt_steps as f32);
        for key in ["loss_quantile", "loss_critic", "mean_q"] {
            assert!(record.get_scalar(key)?.is_finite(), "{}", key);
        }
        assert!(record.get_scalar("loss_quantile")? >= 0.0);

        let compared = opt_steps % 2 == 0;
        for key in ["q_online_mean", "q_teacher_mean", "q_online_dist", "q_teacher_dist"] {
            assert_eq!(record.contains_key(key), compared, "{} at {}", key, opt_steps);
        }
        if compared {
            let dist = record.get_array1("q_online_dist")?;
            assert_eq!(dist.len(), N_PERCENT_POINTS as usize);
            let dist = record.get_array1("q_teacher_dist")?;
            assert_eq!(dist.len(), N_PERCENT_POINTS as usize);
        }
    }
    Ok(())
}

#[test]
fn test_teacher_comparison_does_not_change_training() -> Result<()> {
    let teacher = teacher(N_ACTIONS);
    let with_log_interval = |log_interval| {
        config(TargetAction::Teacher, N_ACTIONS, BATCH_SIZE)
            .sample_percent_pred(IqnSample::Evenly(N_PERCENT_POINTS))
            .sample_percent_tgt(IqnSample::Evenly(N_PERCENT_POINTS))
            .log_interval(log_interval)
    };
    let mut logged = Agent::build(with_log_interval(1), Some(Rc::clone(&teacher)))?;
    let mut silent = Agent::build(with_log_interval(0), Some(Rc::clone(&teacher)))?;
    let dir = TempDir::new("gan_iqn_params")?;
    logged.save_params(dir.path())?;
    silent.load_params(dir.path())?;

    let mut buffer = FixedBuffer::build(&FixedBufferConfig::default());
    for _ in 0..3 {
        let record = logged.opt_with_record(&mut buffer)?;
        assert!(record.contains_key("q_teacher_mean"));
        let record = silent.opt_with_record(&mut buffer)?;
        assert!(!record.contains_key("q_teacher_mean"));
    }

    for (a, b) in [
        (logged.online().get_var_store(), silent.online().get_var_store()),
        (logged.target().get_var_store(), silent.target().get_var_store()),
        (logged.critic().get_var_store(), silent.critic().get_var_store()),
    ] {
        assert!(same_values(&snapshot(a), &snapshot(b)));
    }
    Ok(())
}

#[test]
fn test_critic_gradients_are_cleared_after_step() -> Result<()> {
    let mut agent = agent();
    let mut buffer = FixedBuffer::build(&FixedBufferConfig::default());
    for _ in 0..2 {
        agent.opt(&mut buffer)?;
        for var in agent.critic().get_var_store().trainable_variables() {
            let grad = var.grad();
            assert!(!grad.defined() || grad.abs().max().double_value(&[]) == 0.0);
        }
    }
    Ok(())
}

#[test]
fn test_no_teacher_comparison_without_teacher() -> Result<()> {
    let config = config(TargetAction::Online, N_ACTIONS, BATCH_SIZE)
        .log_interval(1);
    let mut agent = Agent::build(config, None)?;
    let mut buffer = FixedBuffer::build(&FixedBufferConfig::default());
    let record = agent.opt_with_record(&mut buffer)?;
    assert!(record.contains_key("loss_quantile"));
    assert!(!record.contains_key("q_teacher_mean"));
    Ok(())
}

#[test]
fn test_priorities_are_fed_back() -> Result<()> {
    let mut agent = agent();
    let mut buffer = FixedBuffer::build(&FixedBufferConfig {
        prioritized: true,
        ..Default::default()
    });

    agent.opt(&mut buffer)?;
    agent.opt(&mut buffer)?;
    assert_eq!(buffer.priorities.len(), 2);
    for (ixs, td_err) in buffer.priorities.iter() {
        assert_eq!(ixs.len(), BATCH_SIZE);
        assert_eq!(td_err.len(), BATCH_SIZE);
        assert!(td_err.iter().all(|&e| e.is_finite() && e >= 0.0));
    }
    Ok(())
}

#[test]
fn test_wrong_batch_size_is_an_error() {
    let mut agent = agent();
    let mut buffer = FixedBuffer::build(&FixedBufferConfig {
        batch_size: BATCH_SIZE + 1,
        ..Default::default()
    });
    assert!(agent.opt(&mut buffer).is_err());
    assert_eq!(agent.n_opts(), 0);
}
