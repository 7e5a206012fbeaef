use maxent::train::{Smoothing, Trainer};
use maxent::{BeamSearch, MaxentModel};

#[test]
fn test_sigma_validation() {
    let mut trainer = Trainer::new();

    // sigma must be positive
    let result = trainer.set("sigma", "0");
    assert!(result.is_err());
    assert_eq!(result.unwrap_err().to_string(), "sigma must be positive");

    let result = trainer.set("sigma", "-1.0");
    assert_eq!(result.unwrap_err().to_string(), "sigma must be positive");

    assert!(trainer.set("sigma", "0.5").is_ok());
    assert_eq!(trainer.params().sigma(), 0.5);
}

#[test]
fn test_max_iterations_validation() {
    let mut trainer = Trainer::new();

    let result = trainer.set("max_iterations", "0");
    assert_eq!(
        result.unwrap_err().to_string(),
        "max_iterations must be at least 1"
    );
    assert!(Trainer::new().with_max_iterations(0).is_err());

    assert!(trainer.set("max_iterations", "1").is_ok());
    assert_eq!(trainer.get("max_iterations").unwrap(), "1");
}

#[test]
fn test_smoothing_observation_validation() {
    let mut trainer = Trainer::new();

    let result = trainer.set("smoothing_observation", "0.0");
    assert_eq!(
        result.unwrap_err().to_string(),
        "smoothing_observation must be positive"
    );
    assert!(trainer.set("smoothing_observation", "0.25").is_ok());
    assert_eq!(trainer.params().smoothing_observation(), 0.25);
}

#[test]
fn test_ll_threshold_validation() {
    let mut trainer = Trainer::new();

    assert!(trainer.set("ll_threshold", "0.0").is_ok());
    let result = trainer.set("ll_threshold", "-0.001");
    assert_eq!(
        result.unwrap_err().to_string(),
        "ll_threshold must be non-negative"
    );
    assert!(trainer.set("ll_threshold", "1e-5").is_ok());
}

#[test]
fn test_smoothing_flags_by_name() {
    let mut trainer = Trainer::new();
    trainer.set("simple_smoothing", "true").unwrap();
    trainer.set("slack_parameter", "true").unwrap();
    assert_eq!(
        trainer.params().smoothing(),
        Smoothing::SIMPLE | Smoothing::SLACK
    );
    trainer.set("simple_smoothing", "false").unwrap();
    assert_eq!(trainer.get("simple_smoothing").unwrap(), "false");
    assert_eq!(trainer.get("slack_parameter").unwrap(), "true");
}

#[test]
fn test_invalid_parameter_values() {
    let mut trainer = Trainer::new();

    // Invalid number format
    assert!(trainer.set("sigma", "not_a_number").is_err());
    assert!(trainer.set("cutoff", "-1").is_err());
    assert!(trainer.set("max_iterations", "1.5").is_err());
    assert!(trainer.set("gaussian_smoothing", "yes").is_err());
    assert!(trainer.set("empty_context", "discard").is_err());
}

#[test]
fn test_unknown_parameter() {
    let mut trainer = Trainer::new();

    let result = trainer.set("c2", "1.0");
    assert!(result.is_err());
    assert!(result
        .unwrap_err()
        .to_string()
        .contains("unknown parameter"));
    assert!(trainer.get("c2").is_err());
}

#[test]
fn test_beam_size_validation() {
    let mut trainer = Trainer::new().with_cutoff(0);
    trainer.append("a", ["x"]);
    let model: MaxentModel = trainer.train().unwrap();
    let context = |i: usize, tokens: &[&str], _: &[String], _: &()| vec![tokens[i].to_string()];

    // The decoder holds a closure, so it has no Debug impl for unwrap_err
    let err = BeamSearch::new(0, &model, context).err().unwrap();
    assert_eq!(
        err.to_string(),
        "beam_size must be at least 1"
    );
}
