//! End-to-end command-line scenarios, each driving a [`Dispatcher`] over a
//! fresh [`Engine`] the way a real client session would.

use tempfile::tempdir;
use ticket_server::{Dispatcher, Engine};

fn run(engine: &mut Engine, dispatcher: &Dispatcher, line: &str) -> String {
    dispatcher.execute(engine, line).unwrap().0
}

#[test]
fn s1_bootstrap_admin() {
    let dir = tempdir().unwrap();
    let mut engine = Engine::open(dir.path(), 8, 8).unwrap();
    let d = Dispatcher::new();

    assert_eq!(run(&mut engine, &d, "[1] add_user -u root -p 123 -n R -m r@x -g 10"), "[1] 0");
    assert_eq!(run(&mut engine, &d, "[2] login -u root -p 123"), "[2] 0");
}

#[test]
fn s2_train_lifecycle_and_basic_buy() {
    let dir = tempdir().unwrap();
    let mut engine = Engine::open(dir.path(), 8, 8).unwrap();
    let d = Dispatcher::new();

    run(&mut engine, &d, "[1] add_user -u root -p 123 -n R -m r@x -g 10");
    run(&mut engine, &d, "[2] login -u root -p 123");

    assert_eq!(
        run(
            &mut engine,
            &d,
            "[10] add_train -i T -n 3 -m 100 -s A|B|C -p 100|100 -x 08:00 -t 60|60 -o 10 -d 06-01|06-02 -y G"
        ),
        "[10] 0"
    );
    assert_eq!(run(&mut engine, &d, "[11] release_train -i T"), "[11] 0");

    assert_eq!(
        run(&mut engine, &d, "[12] query_ticket -s A -t C -d 06-01 -p time"),
        "[12] 1\nT A 06-01 08:00 -> C 06-01 10:10 200 100"
    );

    assert_eq!(
        run(&mut engine, &d, "[13] buy_ticket -u root -i T -d 06-01 -n 2 -f A -t C"),
        "[13] 400"
    );

    assert_eq!(
        run(&mut engine, &d, "[14] query_order -u root"),
        "[14] 1\n[success] T A 06-01 08:00 -> C 06-01 10:10 200 2"
    );
}

#[test]
fn s3_capacity_queue_and_refund_promotion() {
    let dir = tempdir().unwrap();
    let mut engine = Engine::open(dir.path(), 8, 8).unwrap();
    let d = Dispatcher::new();

    run(&mut engine, &d, "[1] add_user -u root -p 123 -n R -m r@x -g 10");
    run(&mut engine, &d, "[2] login -u root -p 123");
    for (name, g) in [("u1", "3"), ("u2", "3"), ("u3", "3")] {
        run(
            &mut engine,
            &d,
            &format!("[3] add_user -c root -u {name} -p p -n N -m {name}@x -g {g}"),
        );
        run(&mut engine, &d, &format!("[3] login -u {name} -p p"));
    }
    run(
        &mut engine,
        &d,
        "[4] add_train -i T2 -n 3 -m 1 -s X|Y|Z -p 10|20 -x 08:00 -t 60|60 -o _ -d 07-01|07-02 -y G",
    );
    run(&mut engine, &d, "[5] release_train -i T2");

    let a = run(&mut engine, &d, "[20] buy_ticket -u u1 -i T2 -d 07-01 -n 1 -f X -t Y");
    assert_eq!(a, "[20] 10");
    let b = run(&mut engine, &d, "[21] buy_ticket -u u2 -i T2 -d 07-01 -n 1 -f Y -t Z");
    assert_eq!(b, "[21] 10");
    let c = run(&mut engine, &d, "[22] buy_ticket -u u3 -i T2 -d 07-01 -n 1 -f X -t Z -q true");
    assert_eq!(c, "[22] queue");

    assert_eq!(run(&mut engine, &d, "[23] refund_ticket -u u1 -n 1"), "[23] 0");

    let order_line = run(&mut engine, &d, "[24] query_order -u u3");
    assert!(order_line.contains("[success] T2 X 07-01 08:00 -> Z"));
}

#[test]
fn s4_privilege_rules() {
    let dir = tempdir().unwrap();
    let mut engine = Engine::open(dir.path(), 8, 8).unwrap();
    let d = Dispatcher::new();

    run(&mut engine, &d, "[1] add_user -u root -p 123 -n R -m r@x -g 10");
    run(&mut engine, &d, "[2] login -u root -p 123");

    assert_eq!(
        run(&mut engine, &d, "[30] add_user -c root -u alice -p a -n A -m a@x -g 5"),
        "[30] 0"
    );
    run(&mut engine, &d, "[30] login -u alice -p a");

    assert_eq!(
        run(&mut engine, &d, "[31] add_user -c alice -u bob -p b -n B -m b@x -g 6"),
        "[31] -1"
    );

    assert_eq!(
        run(&mut engine, &d, "[32] modify_profile -c alice -u alice -g 4"),
        "[32] alice A a@x 4"
    );
}

#[test]
fn s5_transfer_with_day_shift() {
    let dir = tempdir().unwrap();
    let mut engine = Engine::open(dir.path(), 8, 8).unwrap();
    let d = Dispatcher::new();

    run(&mut engine, &d, "[1] add_user -u root -p 123 -n R -m r@x -g 10");
    run(&mut engine, &d, "[2] login -u root -p 123");

    // Departs 23:00, a 2h leg lands after midnight (hour 25 in the
    // schedule's day-shifted encoding) -- the connecting train only opens
    // for boarding the following morning.
    run(
        &mut engine,
        &d,
        "[10] add_train -i S1 -n 2 -m 50 -s S|M -p 100 -x 23:00 -t 120 -o _ -d 06-01|06-20 -y G",
    );
    run(&mut engine, &d, "[11] release_train -i S1");
    run(
        &mut engine,
        &d,
        "[12] add_train -i S2 -n 2 -m 50 -s M|T -p 100 -x 06:00 -t 120 -o _ -d 06-01|06-20 -y G",
    );
    run(&mut engine, &d, "[13] release_train -i S2");

    let resp = run(&mut engine, &d, "[40] query_transfer -s S -t T -d 06-10 -p time");
    let body = resp.strip_prefix("[40] ").unwrap();
    let mut lines = body.lines();
    let leg1 = lines.next().unwrap();
    let leg2 = lines.next().unwrap();
    assert!(leg1.starts_with("S1 S 06-10 23:00 -> M 06-11 01:00"));
    assert!(leg2.starts_with("S2 M 06-11 06:00 -> T 06-11 08:00"));
}

#[test]
fn s6_persistence_across_restart() {
    let dir = tempdir().unwrap();
    {
        let mut engine = Engine::open(dir.path(), 8, 8).unwrap();
        let d = Dispatcher::new();
        run(&mut engine, &d, "[1] add_user -u root -p 123 -n R -m r@x -g 10");
        run(&mut engine, &d, "[2] login -u root -p 123");
        run(
            &mut engine,
            &d,
            "[3] add_train -i T -n 3 -m 100 -s A|B|C -p 100|100 -x 08:00 -t 60|60 -o 10 -d 06-01|06-02 -y G",
        );
        run(&mut engine, &d, "[4] release_train -i T");
        run(&mut engine, &d, "[5] buy_ticket -u root -i T -d 06-01 -n 2 -f A -t C");
        engine.flush().unwrap();
    }

    let mut engine = Engine::open(dir.path(), 8, 8).unwrap();
    let d = Dispatcher::new();
    run(&mut engine, &d, "[6] login -u root -p 123");
    assert_eq!(
        run(&mut engine, &d, "[7] query_order -u root"),
        "[7] 1\n[success] T A 06-01 08:00 -> C 06-01 10:10 200 2"
    );
    assert_eq!(
        run(&mut engine, &d, "[8] query_ticket -s A -t C -d 06-01 -p time"),
        "[8] 1\nT A 06-01 08:00 -> C 06-01 10:10 200 98"
    );
}
