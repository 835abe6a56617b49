//! The command dispatcher: parses one input line into a verb and a flag
//! map, routes it to the matching handler, and renders the handler's
//! result back into the single response line the protocol expects.
//!
//! Verbs route through a `HashMap<name, Box<dyn Command>>` built once at
//! startup; every handler runs to completion synchronously against a
//! single `Engine`, so there is no async runtime involved.

use std::collections::HashMap;

use ticket_storage::Result;

use crate::booking::{BuyOutcome, Engine};
use crate::model::{Date, MAX_STATIONS};
use crate::planner::SortBy;
use crate::users::ProfilePatch;

/// The flags parsed from one command line (`-x value` pairs), with typed
/// accessors for the field encodings the protocol uses. Never errors on a
/// missing or malformed flag -- callers fall back to a domain rejection
/// (`-1`), per the dispatcher's permissive-input policy.
pub struct Params {
    flags: HashMap<char, String>,
}

impl Params {
    fn parse(rest: &str) -> Self {
        let mut flags = HashMap::new();
        let mut tokens = rest.split_whitespace();
        while let Some(flag_token) = tokens.next() {
            let Some(flag) = flag_token.strip_prefix('-').and_then(|s| s.chars().next()) else {
                continue;
            };
            let Some(value) = tokens.next() else { break };
            flags.insert(flag, value.to_string());
        }
        Self { flags }
    }

    pub fn get(&self, flag: char) -> Option<&str> {
        self.flags.get(&flag).map(String::as_str)
    }

    fn date(&self, flag: char) -> Option<Date> {
        let s = self.get(flag)?;
        let month: u8 = s.get(0..2)?.parse().ok()?;
        let day: u8 = s.get(3..5)?.parse().ok()?;
        Some(Date::new(month, day))
    }

    /// `"MM-DD|MM-DD"` -> `(start, end)`.
    fn sale_range(&self, flag: char) -> Option<(Date, Date)> {
        let s = self.get(flag)?;
        let (start, end) = s.split_once('|')?;
        let start_month: u8 = start.get(0..2)?.parse().ok()?;
        let start_day: u8 = start.get(3..5)?.parse().ok()?;
        let end_month: u8 = end.get(0..2)?.parse().ok()?;
        let end_day: u8 = end.get(3..5)?.parse().ok()?;
        Some((Date::new(start_month, start_day), Date::new(end_month, end_day)))
    }

    fn list(&self, flag: char) -> Option<Vec<&str>> {
        let s = self.get(flag)?;
        if s == "_" {
            return Some(Vec::new());
        }
        Some(s.split('|').collect())
    }

    fn sort_by(&self) -> SortBy {
        match self.get('p') {
            Some("cost") => SortBy::Cost,
            _ => SortBy::Time,
        }
    }

    fn flag_true(&self, flag: char) -> bool {
        self.get(flag) == Some("true")
    }
}

/// One verb handler. Returns the response body (no timestamp bracket, no
/// trailing newline on the last line); the dispatcher adds both.
pub trait Command: Send + Sync {
    fn run(&self, engine: &mut Engine, params: &Params, timestamp: i64) -> Result<String>;
}

const REJECTED: &str = "-1";

/// Routes verbs to handlers by name, built once at startup and shared
/// for the life of the process.
pub struct Dispatcher {
    commands: HashMap<&'static str, Box<dyn Command>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        let mut commands: HashMap<&'static str, Box<dyn Command>> = HashMap::new();
        commands.insert("add_user", Box::new(AddUser));
        commands.insert("login", Box::new(Login));
        commands.insert("logout", Box::new(Logout));
        commands.insert("query_profile", Box::new(QueryProfile));
        commands.insert("modify_profile", Box::new(ModifyProfile));
        commands.insert("add_train", Box::new(AddTrain));
        commands.insert("delete_train", Box::new(DeleteTrain));
        commands.insert("release_train", Box::new(ReleaseTrain));
        commands.insert("query_train", Box::new(QueryTrain));
        commands.insert("query_ticket", Box::new(QueryTicket));
        commands.insert("buy_ticket", Box::new(BuyTicket));
        commands.insert("query_order", Box::new(QueryOrder));
        commands.insert("refund_ticket", Box::new(RefundTicket));
        commands.insert("query_transfer", Box::new(QueryTransfer));
        commands.insert("clean", Box::new(Clean));
        commands.insert("exit", Box::new(Exit));
        Self { commands }
    }

    /// Parses and executes one input line (`[<timestamp>] <verb> ...`).
    /// Returns the full response line (including its timestamp bracket)
    /// and whether the caller should stop reading further input.
    pub fn execute(&self, engine: &mut Engine, line: &str) -> Result<(String, bool)> {
        let line = line.trim();
        let Some((bracketed, rest)) = line.split_once(' ') else {
            return Ok((line.to_string(), false));
        };
        let timestamp: i64 = bracketed
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse()
            .unwrap_or(0);
        let mut parts = rest.trim_start().splitn(2, ' ');
        let verb = parts.next().unwrap_or("").trim();
        let flag_str = parts.next().unwrap_or("");

        tracing::debug!(verb, timestamp, "dispatching command");
        let params = Params::parse(flag_str);
        let body = match self.commands.get(verb) {
            Some(cmd) => cmd.run(engine, &params, timestamp)?,
            None => {
                tracing::warn!(verb, "unrecognized verb");
                REJECTED.to_string()
            }
        };
        let exit = verb == "exit";
        Ok((format!("[{timestamp}] {body}"), exit))
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

struct AddUser;
impl Command for AddUser {
    fn run(&self, engine: &mut Engine, params: &Params, _timestamp: i64) -> Result<String> {
        let cur = params.get('c');
        let (Some(u), Some(p), Some(n), Some(m)) =
            (params.get('u'), params.get('p'), params.get('n'), params.get('m'))
        else {
            return Ok(REJECTED.to_string());
        };
        let Some(privilege) = params.get('g').and_then(|g| g.parse::<u8>().ok()) else {
            return Ok(REJECTED.to_string());
        };
        let (Ok(username), Ok(password), Ok(name), Ok(mail)) =
            (u.try_into(), p.try_into(), n.try_into(), m.try_into())
        else {
            return Ok(REJECTED.to_string());
        };
        let added = engine.add_user(cur, username, password, name, mail, privilege)?;
        Ok(if added { "0".into() } else { REJECTED.to_string() })
    }
}

struct Login;
impl Command for Login {
    fn run(&self, engine: &mut Engine, params: &Params, _timestamp: i64) -> Result<String> {
        let (Some(u), Some(p)) = (params.get('u'), params.get('p')) else {
            return Ok(REJECTED.to_string());
        };
        Ok(if engine.login(u, p)? { "0".into() } else { REJECTED.to_string() })
    }
}

struct Logout;
impl Command for Logout {
    fn run(&self, engine: &mut Engine, params: &Params, _timestamp: i64) -> Result<String> {
        let Some(u) = params.get('u') else {
            return Ok(REJECTED.to_string());
        };
        Ok(if engine.logout(u) { "0".into() } else { REJECTED.to_string() })
    }
}

fn format_profile(u: &crate::model::User) -> String {
    format!("{} {} {} {}", u.username, u.name, u.mail_addr, u.privilege)
}

struct QueryProfile;
impl Command for QueryProfile {
    fn run(&self, engine: &mut Engine, params: &Params, _timestamp: i64) -> Result<String> {
        let (Some(c), Some(u)) = (params.get('c'), params.get('u')) else {
            return Ok(REJECTED.to_string());
        };
        Ok(match engine.query_profile(c, u)? {
            Some(user) => format_profile(&user),
            None => REJECTED.to_string(),
        })
    }
}

struct ModifyProfile;
impl Command for ModifyProfile {
    fn run(&self, engine: &mut Engine, params: &Params, _timestamp: i64) -> Result<String> {
        let (Some(c), Some(u)) = (params.get('c'), params.get('u')) else {
            return Ok(REJECTED.to_string());
        };
        let mut patch = ProfilePatch::default();
        if let Some(p) = params.get('p') {
            let Ok(p) = p.try_into() else { return Ok(REJECTED.to_string()) };
            patch.password = Some(p);
        }
        if let Some(n) = params.get('n') {
            let Ok(n) = n.try_into() else { return Ok(REJECTED.to_string()) };
            patch.name = Some(n);
        }
        if let Some(m) = params.get('m') {
            let Ok(m) = m.try_into() else { return Ok(REJECTED.to_string()) };
            patch.mail_addr = Some(m);
        }
        if let Some(g) = params.get('g') {
            let Some(g) = g.parse::<u8>().ok() else { return Ok(REJECTED.to_string()) };
            patch.privilege = Some(g);
        }
        Ok(match engine.modify_profile(c, u, patch)? {
            Some(user) => format_profile(&user),
            None => REJECTED.to_string(),
        })
    }
}

/// Builds a `Train` from `add_train`'s flags, reconstructing the
/// arrival/departure schedule from `-x`/`-t`/`-o` and the cumulative
/// fare table from `-p`. Any malformed or out-of-range field is a domain
/// rejection (`None`), never a panic.
fn parse_train(params: &Params) -> Option<crate::model::Train> {
    use crate::model::{StationName, Time, Train};

    let train_id = params.get('i')?.try_into().ok()?;
    let station_num: usize = params.get('n')?.parse().ok()?;
    if !(2..=MAX_STATIONS).contains(&station_num) {
        return None;
    }
    let seat_num: u32 = params.get('m')?.parse().ok()?;
    let station_names = params.list('s')?;
    if station_names.len() != station_num {
        return None;
    }
    let price_deltas = params.list('p')?;
    if price_deltas.len() != station_num - 1 {
        return None;
    }
    let travel_times = params.list('t')?;
    if travel_times.len() != station_num - 1 {
        return None;
    }
    let stopover_times = params.list('o')?;
    if !(stopover_times.is_empty() || stopover_times.len() == station_num.saturating_sub(2)) {
        return None;
    }
    let (sale_date_start, sale_date_end) = params.sale_range('d')?;
    let kind = params.get('y')?.bytes().next()?;

    let start = params.get('x')?;
    let start_hour: u16 = start.get(0..2)?.parse().ok()?;
    let start_minute: u8 = start.get(3..5)?.parse().ok()?;

    let mut stations = [StationName::default(); MAX_STATIONS];
    for (slot, name) in stations.iter_mut().zip(&station_names) {
        *slot = (*name).try_into().ok()?;
    }

    let mut prices = [0i64; MAX_STATIONS];
    for (idx, delta) in price_deltas.iter().enumerate() {
        let delta: i64 = delta.parse().ok()?;
        prices[idx + 1] = prices[idx] + delta;
    }

    let travel_times: Vec<i64> = travel_times.iter().map(|s| s.parse().ok()).collect::<Option<_>>()?;
    let stopover_times: Vec<i64> = if stopover_times.is_empty() {
        vec![0; station_num.saturating_sub(2)]
    } else {
        stopover_times.iter().map(|s| s.parse().ok()).collect::<Option<_>>()?
    };

    let mut arrival_times = [Time::new(0, 0); MAX_STATIONS];
    let mut departure_times = [Time::new(0, 0); MAX_STATIONS];
    departure_times[0] = Time::new(start_hour, start_minute);
    for i in 1..station_num {
        arrival_times[i] = departure_times[i - 1].add_minutes(travel_times[i - 1]);
        departure_times[i] = if i < station_num - 1 {
            arrival_times[i].add_minutes(stopover_times[i - 1])
        } else {
            Time::new(0, 0)
        };
    }

    Some(Train {
        train_id,
        kind,
        station_num: station_num as u8,
        stations,
        seat_num,
        prices,
        arrival_times,
        departure_times,
        sale_date_start,
        sale_date_end,
        is_released: false,
        seat_map_pos: -1,
    })
}

struct AddTrain;
impl Command for AddTrain {
    fn run(&self, engine: &mut Engine, params: &Params, _timestamp: i64) -> Result<String> {
        let Some(train) = parse_train(params) else {
            return Ok(REJECTED.to_string());
        };
        Ok(if engine.add_train(train)? { "0".into() } else { REJECTED.to_string() })
    }
}

struct DeleteTrain;
impl Command for DeleteTrain {
    fn run(&self, engine: &mut Engine, params: &Params, _timestamp: i64) -> Result<String> {
        let Some(i) = params.get('i') else { return Ok(REJECTED.to_string()) };
        Ok(if engine.delete_train(i)? { "0".into() } else { REJECTED.to_string() })
    }
}

struct ReleaseTrain;
impl Command for ReleaseTrain {
    fn run(&self, engine: &mut Engine, params: &Params, _timestamp: i64) -> Result<String> {
        let Some(i) = params.get('i') else { return Ok(REJECTED.to_string()) };
        Ok(if engine.release_train(i)? {
            "0".into()
        } else {
            tracing::warn!(train_id = i, "release_train rejected");
            REJECTED.to_string()
        })
    }
}

/// Renders `query_train`'s multi-line body: one header line, one line per
/// station. Station 0's arrival and the last station's departure are
/// unobservable (a train neither arrives before its first stop nor
/// departs after its last), so both print as the protocol's `xx-xx
/// xx:xx` placeholder.
fn format_train(train: &crate::model::Train, seats: &[u32], date: Date) -> String {
    use crate::model::TimePoint;

    let n = train.station_num as usize;
    let mut lines = Vec::with_capacity(n + 1);
    lines.push(format!("{} {}", train.train_id, train.kind as char));

    let dep0 = TimePoint::from_offset(date, train.departure_times[0]);
    lines.push(format!(
        "{} xx-xx xx:xx -> {} {} {}",
        train.stations[0], dep0, train.prices[0], seats[0]
    ));

    for i in 1..n - 1 {
        let arrival = TimePoint::from_offset(date, train.arrival_times[i]);
        let departure = TimePoint::from_offset(date, train.departure_times[i]);
        lines.push(format!(
            "{} {} -> {} {} {}",
            train.stations[i], arrival, departure, train.prices[i], seats[i]
        ));
    }

    let last = n - 1;
    let arrival = TimePoint::from_offset(date, train.arrival_times[last]);
    lines.push(format!(
        "{} {} -> xx-xx xx:xx {} x",
        train.stations[last], arrival, train.prices[last]
    ));
    lines.join("\n")
}

struct QueryTrain;
impl Command for QueryTrain {
    fn run(&self, engine: &mut Engine, params: &Params, _timestamp: i64) -> Result<String> {
        let (Some(i), Some(date)) = (params.get('i'), params.date('d')) else {
            return Ok(REJECTED.to_string());
        };
        Ok(match engine.query_train(i, date)? {
            Some((train, seats)) => format_train(&train, &seats, date),
            None => REJECTED.to_string(),
        })
    }
}

fn format_ticket(t: &crate::planner::TicketInfo) -> String {
    format!("{} {} {} -> {} {} {} {}", t.train_id, t.from, t.departure, t.to, t.arrival, t.price, t.seats)
}

struct QueryTicket;
impl Command for QueryTicket {
    fn run(&self, engine: &mut Engine, params: &Params, _timestamp: i64) -> Result<String> {
        let (Some(s), Some(t), Some(date)) = (params.get('s'), params.get('t'), params.date('d'))
        else {
            return Ok("0".to_string());
        };
        let tickets = engine.query_ticket(s, t, date, params.sort_by())?;
        if tickets.is_empty() {
            return Ok("0".to_string());
        }
        let mut lines = vec![tickets.len().to_string()];
        lines.extend(tickets.iter().map(format_ticket));
        Ok(lines.join("\n"))
    }
}

struct BuyTicket;
impl Command for BuyTicket {
    fn run(&self, engine: &mut Engine, params: &Params, timestamp: i64) -> Result<String> {
        let (Some(u), Some(i), Some(date), Some(f), Some(t)) =
            (params.get('u'), params.get('i'), params.date('d'), params.get('f'), params.get('t'))
        else {
            return Ok(REJECTED.to_string());
        };
        let Some(n) = params.get('n').and_then(|n| n.parse::<u32>().ok()) else {
            return Ok(REJECTED.to_string());
        };
        let wait = params.flag_true('q');
        let outcome = engine.buy_ticket(u, i, date, f, t, n, wait, timestamp)?;
        Ok(match outcome {
            BuyOutcome::Booked(total) => total.to_string(),
            BuyOutcome::Queued => "queue".to_string(),
            BuyOutcome::Rejected => REJECTED.to_string(),
        })
    }
}

fn format_order(o: &crate::model::Order) -> String {
    format!(
        "[{}] {} {} {} -> {} {} {} {}",
        o.status.as_str(),
        o.train_id,
        o.from,
        o.start_time,
        o.to,
        o.end_time,
        o.price,
        o.ticket_num
    )
}

struct QueryOrder;
impl Command for QueryOrder {
    fn run(&self, engine: &mut Engine, params: &Params, _timestamp: i64) -> Result<String> {
        let Some(u) = params.get('u') else { return Ok(REJECTED.to_string()) };
        if !engine.logins.is_logged_in(u) {
            return Ok(REJECTED.to_string());
        }
        let orders = engine.list_orders_most_recent_first(u)?;
        if orders.is_empty() {
            return Ok("0".to_string());
        }
        let mut lines = vec![orders.len().to_string()];
        lines.extend(orders.iter().map(format_order));
        Ok(lines.join("\n"))
    }
}

struct RefundTicket;
impl Command for RefundTicket {
    fn run(&self, engine: &mut Engine, params: &Params, _timestamp: i64) -> Result<String> {
        let Some(u) = params.get('u') else { return Ok(REJECTED.to_string()) };
        let k = params.get('n').and_then(|n| n.parse::<usize>().ok()).unwrap_or(1);
        Ok(if engine.refund_ticket(u, k)? { "0".into() } else { REJECTED.to_string() })
    }
}

struct QueryTransfer;
impl Command for QueryTransfer {
    fn run(&self, engine: &mut Engine, params: &Params, _timestamp: i64) -> Result<String> {
        let (Some(s), Some(t), Some(date)) = (params.get('s'), params.get('t'), params.date('d'))
        else {
            return Ok("0".to_string());
        };
        Ok(match engine.query_transfer(s, t, date, params.sort_by())? {
            Some((leg1, leg2)) => format!("{}\n{}", format_ticket(&leg1), format_ticket(&leg2)),
            None => "0".to_string(),
        })
    }
}

struct Clean;
impl Command for Clean {
    fn run(&self, engine: &mut Engine, _params: &Params, _timestamp: i64) -> Result<String> {
        engine.clean()?;
        Ok("0".to_string())
    }
}

struct Exit;
impl Command for Exit {
    fn run(&self, _engine: &mut Engine, _params: &Params, _timestamp: i64) -> Result<String> {
        Ok("bye".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn setup() -> (tempfile::TempDir, Engine, Dispatcher) {
        let dir = tempdir().unwrap();
        let engine = Engine::open(dir.path(), 8, 8).unwrap();
        (dir, engine, Dispatcher::new())
    }

    #[test]
    fn bootstrap_admin_then_login_round_trip() {
        let (_dir, mut engine, d) = setup();
        let (resp, exit) = d
            .execute(&mut engine, "[1] add_user -c root -u root -p 123 -n Root -m r@x.com -g 10")
            .unwrap();
        assert_eq!(resp, "[1] 0");
        assert!(!exit);

        let (resp, _) = d.execute(&mut engine, "[2] login -u root -p 123").unwrap();
        assert_eq!(resp, "[2] 0");

        let (resp, _) = d.execute(&mut engine, "[3] login -u root -p wrong").unwrap();
        assert_eq!(resp, "[3] -1");
    }

    #[test]
    fn add_train_release_and_query_train_format() {
        let (_dir, mut engine, d) = setup();
        d.execute(&mut engine, "[1] add_user -c root -u root -p 123 -n Root -m r@x.com -g 10")
            .unwrap();
        d.execute(&mut engine, "[2] login -u root -p 123").unwrap();

        let (resp, _) = d
            .execute(
                &mut engine,
                "[3] add_train -i G1 -n 3 -m 5 -s A|B|C -p 10|20 -x 08:00 -t 60|60 -o _ -d 06-01|06-05 -y G",
            )
            .unwrap();
        assert_eq!(resp, "[3] 0");

        let (resp, _) = d.execute(&mut engine, "[4] release_train -i G1").unwrap();
        assert_eq!(resp, "[4] 0");

        let (resp, _) = d.execute(&mut engine, "[5] query_train -i G1 -d 06-01").unwrap();
        assert!(resp.starts_with("[5] G1 G\n"));
        assert!(resp.contains("A xx-xx xx:xx -> 06-01 08:00 0 5"));
        assert!(resp.contains("C "));
    }

    #[test]
    fn buy_ticket_then_query_order_and_refund() {
        let (_dir, mut engine, d) = setup();
        d.execute(&mut engine, "[1] add_user -c root -u root -p 123 -n Root -m r@x.com -g 10")
            .unwrap();
        d.execute(&mut engine, "[2] login -u root -p 123").unwrap();
        d.execute(
            &mut engine,
            "[3] add_train -i G1 -n 3 -m 1 -s A|B|C -p 10|20 -x 08:00 -t 60|60 -o _ -d 06-01|06-05 -y G",
        )
        .unwrap();
        d.execute(&mut engine, "[4] release_train -i G1").unwrap();

        let (resp, _) = d
            .execute(&mut engine, "[5] buy_ticket -u root -i G1 -d 06-01 -n 1 -f A -t C")
            .unwrap();
        assert_eq!(resp, "[5] 20");

        let (resp, _) = d.execute(&mut engine, "[6] query_order -u root").unwrap();
        assert!(resp.starts_with("[6] 1\n[success] G1 A 06-01 08:00 -> C 06-01 10:00 20 1"));

        let (resp, _) = d.execute(&mut engine, "[7] refund_ticket -u root").unwrap();
        assert_eq!(resp, "[7] 0");
    }

    #[test]
    fn unknown_verb_is_rejected_not_fatal() {
        let (_dir, mut engine, d) = setup();
        let (resp, exit) = d.execute(&mut engine, "[1] frobnicate -x y").unwrap();
        assert_eq!(resp, "[1] -1");
        assert!(!exit);
    }

    #[test]
    fn exit_signals_shutdown() {
        let (_dir, mut engine, d) = setup();
        let (resp, exit) = d.execute(&mut engine, "[9] exit").unwrap();
        assert_eq!(resp, "[9] bye");
        assert!(exit);
    }
}
