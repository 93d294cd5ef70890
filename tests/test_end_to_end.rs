use crfseg::train::Trainer;
use crfseg::{Dataset, Init, LoadMode, Model, ModelStore, Tagger};

fn corpus() -> (Vec<Vec<Vec<String>>>, Vec<Vec<&'static str>>) {
    let sentences = ["北京", "我爱北京", "天安门", "我爱天安门", "北京天安门"];
    let tags = [
        vec!["B", "E"],
        vec!["S", "S", "B", "E"],
        vec!["B", "M", "E"],
        vec!["S", "S", "B", "M", "E"],
        vec!["B", "E", "B", "M", "E"],
    ];
    let xseqs = sentences.iter().map(|s| features(s)).collect();
    (xseqs, tags.to_vec())
}

/// Character unigram features with one character of context
fn features(sentence: &str) -> Vec<Vec<String>> {
    let chars: Vec<char> = sentence.chars().collect();
    (0..chars.len())
        .map(|i| {
            let mut item = vec![format!("c={}", chars[i])];
            item.push(match i.checked_sub(1) {
                Some(j) => format!("l={}", chars[j]),
                None => "l=<s>".to_string(),
            });
            item.push(match chars.get(i + 1) {
                Some(c) => format!("r={}", c),
                None => "r=</s>".to_string(),
            });
            item
        })
        .collect()
}

#[test]
fn test_train_save_load_tag() {
    let (xseqs, yseqs) = corpus();
    let mut data = Dataset::new();
    for (xseq, yseq) in xseqs.iter().zip(&yseqs) {
        data.append(xseq, yseq).unwrap();
    }

    let mut model = Model::new(data.num_features(), data.num_tags(), Init::Zero).unwrap();
    let mut trainer = Trainer::new()
        .with_rate0(0.5)
        .unwrap()
        .with_max_iterations(40)
        .unwrap();
    trainer.params_mut().set_shuffle_seed(Some(2024));
    trainer.train(&mut model, data.examples()).unwrap();

    let temp_file = tempfile::NamedTempFile::new().unwrap();
    ModelStore::save(&model, temp_file.path()).unwrap();
    let loaded = ModelStore::load(temp_file.path(), LoadMode::Strict).unwrap();

    let tagger = Tagger::new(&loaded);
    let mut correct = 0;
    let mut total = 0;
    for (xseq, yseq) in xseqs.iter().zip(&yseqs) {
        let predicted = tagger.tag(&data.encode(xseq)).unwrap();
        for (p, y) in predicted.iter().zip(yseq) {
            if data.tag_name(*p) == Some(*y) {
                correct += 1;
            }
            total += 1;
        }
    }
    let accuracy = correct as f64 / total as f64;
    assert!(accuracy > 0.9, "accuracy too low: {:.2}", accuracy);

    // The original and the reloaded model agree on every sequence
    let original = Tagger::new(&model);
    for xseq in &xseqs {
        let ids = data.encode(xseq);
        assert_eq!(original.tag(&ids).unwrap(), tagger.tag(&ids).unwrap());
    }
}
