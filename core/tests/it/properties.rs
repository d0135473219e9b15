use crate::helpers::Network;
use proptest::prelude::*;
use tree_fugue_core::TreeFugueText;

const REPLICAS: usize = 3;

#[derive(Debug, Clone)]
enum Step {
    Insert {
        replica: usize,
        at: usize,
        text: String,
    },
    Delete {
        replica: usize,
        at: usize,
        count: usize,
    },
    Sync {
        replica: usize,
    },
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        3 => (0..REPLICAS, any::<usize>(), "[a-z]{1,4}")
            .prop_map(|(replica, at, text)| Step::Insert { replica, at, text }),
        1 => (0..REPLICAS, any::<usize>(), 1..3usize)
            .prop_map(|(replica, at, count)| Step::Delete { replica, at, count }),
        1 => (0..REPLICAS).prop_map(|replica| Step::Sync { replica }),
    ]
}

fn run(steps: &[Step]) -> Network {
    let mut net = Network::new(REPLICAS);
    for step in steps {
        match step {
            Step::Insert { replica, at, text } => {
                let len = net.replicas[*replica].len();
                net.insert(*replica, at % (len + 1), text);
            }
            Step::Delete {
                replica,
                at,
                count,
            } => {
                let len = net.replicas[*replica].len();
                if len == 0 {
                    continue;
                }
                let start = at % len;
                let count = (*count).min(len - start);
                net.delete(*replica, start, count);
            }
            Step::Sync { replica } => {
                net.sync(*replica);
            }
        }
    }
    net
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]

    #[test]
    fn replicas_converge(steps in prop::collection::vec(step_strategy(), 1..40)) {
        let mut net = run(&steps);
        net.sync_all();
        net.assert_converged();
        net.assert_mirrors();
    }

    #[test]
    fn position_round_trip(steps in prop::collection::vec(step_strategy(), 1..30)) {
        let mut net = run(&steps);
        net.sync_all();
        let text = &net.replicas[0];
        for index in 0..text.len() {
            let pos = text.get_position(index).unwrap();
            prop_assert_eq!(text.find_position(&pos).unwrap(), (index, true));

            // The same anchor resolves to the same character everywhere
            for other in &net.replicas[1..] {
                let (other_index, present) = other.find_position(&pos).unwrap();
                prop_assert!(present);
                prop_assert_eq!(other.char_at(other_index).unwrap(), text.char_at(index).unwrap());
            }
        }
    }

    #[test]
    fn save_load_preserves_text(steps in prop::collection::vec(step_strategy(), 1..30)) {
        let net = run(&steps);
        for (i, replica) in net.replicas.iter().enumerate() {
            let mut loaded = TreeFugueText::new(format!("replica{}", i));
            loaded.load(&replica.save().unwrap()).unwrap();
            prop_assert_eq!(loaded.to_string(), replica.to_string());
        }
    }
}
