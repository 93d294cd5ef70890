use crfseg::train::{RegScope, Trainer};
use crfseg::{Dataset, Init, Model};

fn dataset() -> Dataset {
    let mut data = Dataset::new();
    // Characters of "北京" / "天安门" / single-character words with B/M/E/S tags
    data.append(&[vec!["c=北", "r=京"], vec!["c=京", "l=北"]], &["B", "E"])
        .unwrap();
    data.append(
        &[vec!["c=天", "r=安"], vec!["c=安", "l=天", "r=门"], vec!["c=门", "l=安"]],
        &["B", "M", "E"],
    )
    .unwrap();
    data.append(&[vec!["c=我", "r=爱"], vec!["c=爱", "l=我"]], &["S", "S"])
        .unwrap();
    data
}

#[test]
fn test_basic_training() {
    let _ = env_logger::builder().is_test(true).try_init();

    let data = dataset();
    let mut model = Model::new(data.num_features(), data.num_tags(), Init::Zero).unwrap();
    let mut trainer = Trainer::new()
        .with_rate0(0.5)
        .unwrap()
        .with_max_iterations(30)
        .unwrap();
    trainer.params_mut().set("shuffle_seed", "7").unwrap();

    let report = trainer.train(&mut model, data.examples()).unwrap();
    assert_eq!(report.epoch_losses.len(), 30);
    assert_eq!(report.degenerate, 0);
    let first = report.epoch_losses[0];
    let last = *report.epoch_losses.last().unwrap();
    assert!(last < first, "objective did not decrease: {} -> {}", first, last);
}

#[test]
fn test_seeded_training_is_deterministic() {
    let data = dataset();
    let mut trainer = Trainer::new().with_batch_size(2).unwrap();
    trainer.params_mut().set_shuffle_seed(Some(3));
    trainer.params_mut().set_max_iterations(5).unwrap();

    let mut a = Model::new(data.num_features(), data.num_tags(), Init::Zero).unwrap();
    let mut b = a.new_like(false);
    trainer.train(&mut a, data.examples()).unwrap();
    trainer.train(&mut b, data.examples()).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_parallel_training_matches_sequential() {
    let data = dataset();
    let mut trainer = Trainer::new().with_batch_size(3).unwrap();
    trainer.params_mut().set_shuffle_seed(Some(11));
    trainer.params_mut().set_max_iterations(4).unwrap();

    let mut sequential = Model::new(data.num_features(), data.num_tags(), Init::Zero).unwrap();
    let mut parallel = sequential.new_like(true);
    let a = trainer.train(&mut sequential, data.examples()).unwrap();
    trainer.params_mut().set_parallel(true);
    let b = trainer.train(&mut parallel, data.examples()).unwrap();

    for (x, y) in a.epoch_losses.iter().zip(&b.epoch_losses) {
        assert!((x - y).abs() < 1e-9);
    }
    for (x, y) in sequential.weights().iter().zip(parallel.weights()) {
        assert!((x - y).abs() < 1e-9);
    }
}

#[test]
fn test_untouched_weights_keep_their_value() {
    let data = dataset();
    // Extra features never seen in the data
    let mut model = Model::new(data.num_features() + 2, data.num_tags(), Init::Zero).unwrap();
    let unseen = model.node_index(data.num_features(), 0);
    model.weights_mut()[unseen] = 0.75;

    let mut trainer = Trainer::new();
    trainer.params_mut().set_max_iterations(3).unwrap();
    trainer.params_mut().set_shuffle_seed(Some(1));
    trainer.train(&mut model, data.examples()).unwrap();
    assert_eq!(model.weights()[unseen], 0.75);

    // Regularizing every weight decays it as well
    trainer.params_mut().set_reg_scope(RegScope::All);
    trainer.train(&mut model, data.examples()).unwrap();
    assert!(model.weights()[unseen] < 0.75);
}

#[test]
fn test_trainer_validation() {
    let mut model = Model::new(1, 1, Init::Zero).unwrap();
    // Should fail without training data
    assert!(Trainer::new().train(&mut model, &[]).is_err());

    // Feature ids outside the model abort training
    let data = dataset();
    let mut small = Model::new(1, data.num_tags(), Init::Zero).unwrap();
    assert!(Trainer::new().train(&mut small, data.examples()).is_err());
}
