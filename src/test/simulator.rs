use crate::sim::{Event, SimTime, Simulator, World};
use std::any::Any;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct CountingWorld {
    ticks: usize,
}

impl World for CountingWorld {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn tick(world: &mut dyn World) {
    if let Some(w) = world.as_any_mut().downcast_mut::<CountingWorld>() {
        w.ticks += 1;
    }
}

type Log = Arc<Mutex<Vec<(u32, SimTime)>>>;

/// Records its id and the time it ran at.
struct Mark {
    id: u32,
    log: Log,
}

impl Event for Mark {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        tick(world);
        self.log.lock().expect("log lock").push((self.id, sim.now()));
    }
}

/// Schedules a follow-up at an absolute time that may already be past.
struct MarkThenScheduleAt {
    id: u32,
    at_secs: f64,
    log: Log,
}

impl Event for MarkThenScheduleAt {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        tick(world);
        let MarkThenScheduleAt { id, at_secs, log } = *self;
        log.lock().expect("log lock").push((id, sim.now()));
        sim.schedule_at_secs(at_secs, Mark { id: id + 1, log });
    }
}

fn ids(log: &Log) -> Vec<u32> {
    log.lock().expect("log lock").iter().map(|(id, _)| *id).collect()
}

#[test]
fn equal_times_run_in_scheduling_order() {
    let log = Log::default();
    let mut sim = Simulator::default();
    for (id, secs) in [(1, 2.0), (2, 1.0), (3, 2.0), (4, 1.0)] {
        sim.schedule_at_secs(
            secs,
            Mark {
                id,
                log: Arc::clone(&log),
            },
        );
    }
    assert_eq!(sim.pending(), 4);

    let mut world = CountingWorld::default();
    sim.run(&mut world);

    assert_eq!(ids(&log), vec![2, 4, 1, 3]);
    assert_eq!(world.ticks, 4);
    assert_eq!(sim.now_secs(), 2.0);
    assert_eq!(sim.pending(), 0);
}

#[test]
fn past_timestamps_fire_at_the_current_time() {
    let log = Log::default();
    let mut sim = Simulator::default();
    sim.schedule_at_secs(
        5.0,
        MarkThenScheduleAt {
            id: 1,
            at_secs: 1.0,
            log: Arc::clone(&log),
        },
    );

    let mut world = CountingWorld::default();
    sim.run(&mut world);

    let log = log.lock().expect("log lock");
    assert_eq!(
        *log,
        vec![(1, SimTime::from_secs(5)), (2, SimTime::from_secs(5))]
    );
}

#[test]
fn relative_scheduling_adds_to_now() {
    let log = Log::default();
    let mut sim = Simulator::default();
    sim.schedule_in_secs(
        0.25,
        Mark {
            id: 1,
            log: Arc::clone(&log),
        },
    );

    let mut world = CountingWorld::default();
    sim.run(&mut world);

    assert_eq!(
        *log.lock().expect("log lock"),
        vec![(1, SimTime::from_millis(250))]
    );
}

#[test]
fn run_until_stops_at_the_horizon_and_resumes() {
    let log = Log::default();
    let mut sim = Simulator::default();
    for (id, secs) in [(1, 1.0), (2, 5.0), (3, 9.0)] {
        sim.schedule_at_secs(
            secs,
            Mark {
                id,
                log: Arc::clone(&log),
            },
        );
    }

    let mut world = CountingWorld::default();
    sim.run_until(SimTime::from_secs(5), &mut world);
    assert_eq!(ids(&log), vec![1, 2]);
    assert_eq!(sim.now(), SimTime::from_secs(5));
    assert_eq!(sim.pending(), 1);

    sim.run_until(SimTime::from_secs(7), &mut world);
    assert_eq!(sim.now(), SimTime::from_secs(7));
    assert_eq!(world.ticks, 2);

    sim.run(&mut world);
    assert_eq!(ids(&log), vec![1, 2, 3]);
    assert_eq!(sim.now_secs(), 9.0);
}

#[test]
fn events_are_named_after_their_type() {
    let log = Log::default();
    assert_eq!(Mark { id: 0, log }.name(), "Mark");
}
