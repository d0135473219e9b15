use tracing_subscriber::EnvFilter;
use tree_fugue_core::{MessageMeta, TextEvent, TreeFugueText};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Replicas sharing one broadcast log
///
/// Every local operation is appended to the log in the order it was made,
/// so delivering a prefix of the log is always causally ordered. Each
/// replica also keeps a plain mirror maintained only from its events.
pub struct Network {
    pub replicas: Vec<TreeFugueText>,
    mirrors: Vec<Vec<char>>,
    log: Vec<(usize, bytes::Bytes)>,
    cursors: Vec<usize>,
}

impl Network {
    pub fn new(count: usize) -> Self {
        init_tracing();
        Self {
            replicas: (0..count)
                .map(|i| TreeFugueText::new(format!("replica{}", i)))
                .collect(),
            mirrors: vec![Vec::new(); count],
            log: Vec::new(),
            cursors: vec![0; count],
        }
    }

    pub fn insert(&mut self, replica: usize, index: usize, text: &str) {
        let events = self.replicas[replica].insert(index, text).unwrap();
        self.mirror(replica, &events);
        self.publish(replica);
    }

    pub fn delete(&mut self, replica: usize, start: usize, count: usize) {
        let events = self.replicas[replica].delete(start, count).unwrap();
        self.mirror(replica, &events);
        self.publish(replica);
    }

    /// Deliver every operation `replica` has not seen yet
    pub fn sync(&mut self, replica: usize) -> Vec<TextEvent> {
        let mut events = Vec::new();
        while self.cursors[replica] < self.log.len() {
            let (sender, message) = &self.log[self.cursors[replica]];
            self.cursors[replica] += 1;
            if *sender == replica {
                continue;
            }
            let meta = MessageMeta::remote(format!("replica{}", sender));
            if let Some(event) = self.replicas[replica].receive(message, meta).unwrap() {
                self.mirror(replica, std::slice::from_ref(&event));
                events.push(event);
            }
        }
        events
    }

    pub fn sync_all(&mut self) {
        for replica in 0..self.replicas.len() {
            self.sync(replica);
        }
    }

    pub fn text(&self, replica: usize) -> String {
        self.replicas[replica].to_string()
    }

    pub fn assert_converged(&self) {
        let first = self.text(0);
        for (i, replica) in self.replicas.iter().enumerate() {
            assert_eq!(replica.to_string(), first, "replica{} diverged", i);
            assert_eq!(replica.len(), first.chars().count());
        }
    }

    /// Assert every replica's event-built mirror matches its text
    pub fn assert_mirrors(&self) {
        for (i, mirror) in self.mirrors.iter().enumerate() {
            let mirrored: String = mirror.iter().collect();
            assert_eq!(mirrored, self.text(i), "events of replica{} are off", i);
        }
    }

    fn mirror(&mut self, replica: usize, events: &[TextEvent]) {
        for event in events {
            apply_event(&mut self.mirrors[replica], event, &self.replicas[replica]);
        }
    }

    fn publish(&mut self, replica: usize) {
        for message in self.replicas[replica].take_outbox() {
            self.log.push((replica, message));
        }
    }
}

/// Operation queued by its sender, with the sender's delivery vector at
/// the time it was made
struct Queued {
    deps: Vec<usize>,
    message: bytes::Bytes,
}

/// Replicas with one queue per sender and causal, but otherwise arbitrary,
/// delivery order
///
/// `delivered[r][s]` counts how many of `s`'s operations replica `r` has
/// applied. An operation is deliverable once its dependency vector is
/// covered, so different replicas see concurrent operations in different
/// orders.
pub struct CausalNetwork {
    pub replicas: Vec<TreeFugueText>,
    mirrors: Vec<Vec<char>>,
    queues: Vec<Vec<Queued>>,
    delivered: Vec<Vec<usize>>,
}

impl CausalNetwork {
    pub fn new(count: usize) -> Self {
        init_tracing();
        Self {
            replicas: (0..count)
                .map(|i| TreeFugueText::new(format!("replica{}", i)))
                .collect(),
            mirrors: vec![Vec::new(); count],
            queues: (0..count).map(|_| Vec::new()).collect(),
            delivered: vec![vec![0; count]; count],
        }
    }

    pub fn insert(&mut self, replica: usize, index: usize, text: &str) {
        let events = self.replicas[replica].insert(index, text).unwrap();
        apply_events(&mut self.mirrors[replica], &events, &self.replicas[replica]);
        self.enqueue(replica);
    }

    pub fn delete(&mut self, replica: usize, start: usize, count: usize) {
        let events = self.replicas[replica].delete(start, count).unwrap();
        apply_events(&mut self.mirrors[replica], &events, &self.replicas[replica]);
        self.enqueue(replica);
    }

    /// Senders whose next operation `replica` can apply now
    pub fn deliverable(&self, replica: usize) -> Vec<usize> {
        let seen = &self.delivered[replica];
        (0..self.replicas.len())
            .filter(|&sender| sender != replica)
            .filter(|&sender| {
                self.queues[sender]
                    .get(seen[sender])
                    .map(|q| q.deps.iter().zip(seen).all(|(need, have)| need <= have))
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Apply the next operation of `sender` at `replica`
    pub fn deliver(&mut self, replica: usize, sender: usize) {
        let next = self.delivered[replica][sender];
        let message = self.queues[sender][next].message.clone();
        self.delivered[replica][sender] += 1;

        let meta = MessageMeta::remote(format!("replica{}", sender));
        if let Some(event) = self.replicas[replica].receive(&message, meta).unwrap() {
            apply_events(
                &mut self.mirrors[replica],
                std::slice::from_ref(&event),
                &self.replicas[replica],
            );
        }
    }

    /// Deliver everything still pending, in rounds
    pub fn flush(&mut self) {
        loop {
            let mut progressed = false;
            for replica in 0..self.replicas.len() {
                for sender in self.deliverable(replica) {
                    self.deliver(replica, sender);
                    progressed = true;
                }
            }
            if !progressed {
                break;
            }
        }
        for replica in 0..self.replicas.len() {
            for sender in 0..self.replicas.len() {
                if sender != replica {
                    assert_eq!(
                        self.delivered[replica][sender],
                        self.queues[sender].len(),
                        "replica{} stuck behind replica{}",
                        replica,
                        sender
                    );
                }
            }
        }
    }

    pub fn text(&self, replica: usize) -> String {
        self.replicas[replica].to_string()
    }

    pub fn assert_mirrors(&self) {
        for (i, mirror) in self.mirrors.iter().enumerate() {
            let mirrored: String = mirror.iter().collect();
            assert_eq!(mirrored, self.text(i), "events of replica{} are off", i);
        }
    }

    fn enqueue(&mut self, replica: usize) {
        for message in self.replicas[replica].take_outbox() {
            let deps = self.delivered[replica].clone();
            self.queues[replica].push(Queued { deps, message });
            self.delivered[replica][replica] += 1;
        }
    }
}

fn apply_events(mirror: &mut Vec<char>, events: &[TextEvent], source: &TreeFugueText) {
    for event in events {
        apply_event(mirror, event, source);
    }
}

/// Apply an event to a plain mirror of the text
///
/// Inserted characters are read back from `source`, so this must run right
/// after the event was emitted.
fn apply_event(mirror: &mut Vec<char>, event: &TextEvent, source: &TreeFugueText) {
    match event {
        TextEvent::Insert {
            start_index, count, ..
        } => {
            for i in 0..*count {
                let c = source.char_at(start_index + i).unwrap();
                mirror.insert(start_index + i, c);
            }
        }
        TextEvent::Delete {
            start_index,
            count,
            deleted_values,
            ..
        } => {
            let removed: String = mirror.drain(*start_index..start_index + count).collect();
            assert_eq!(&removed, deleted_values);
        }
    }
}
