use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_postgres::{Client, Config, NoTls, SimpleQueryMessage, SimpleQueryRow};
use ulid::Ulid;

use spacebook::clock::SystemClock;
use spacebook::engine::BookingWorkflow;
use spacebook::tenant::TenantManager;
use spacebook::wire::{self, SpacebookFactory};

const PASSWORD: &str = "spacebook";
/// Far enough ahead that the real clock never makes it past.
const DAY: &str = "2099-03-10";

// ── Test infrastructure ──────────────────────────────────────

async fn start_test_server(workflow: BookingWorkflow) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let dir = std::env::temp_dir().join(format!("spacebook_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let tm = Arc::new(TenantManager::new(
        dir,
        1000,
        Arc::new(SystemClock::utc()),
        workflow,
    ));
    let admins: HashSet<String> = ["admin".to_string()].into();
    let factory = Arc::new(SpacebookFactory::new(tm, PASSWORD.to_string(), admins));

    tokio::spawn(async move {
        loop {
            let (socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let factory = factory.clone();
            tokio::spawn(async move {
                let _ = wire::process_connection(socket, factory, None).await;
            });
        }
    });

    addr
}

async fn connect(addr: SocketAddr, user: &str) -> Client {
    let mut config = Config::new();
    config
        .host(addr.ip().to_string())
        .port(addr.port())
        .dbname("test")
        .user(user)
        .password(PASSWORD);

    let (client, connection) = config.connect(NoTls).await.unwrap();
    tokio::spawn(async move {
        let _ = connection.await;
    });
    client
}

async fn rows(client: &Client, sql: &str) -> Vec<SimpleQueryRow> {
    client
        .simple_query(sql)
        .await
        .unwrap()
        .into_iter()
        .filter_map(|m| match m {
            SimpleQueryMessage::Row(r) => Some(r),
            _ => None,
        })
        .collect()
}

async fn sqlstate(client: &Client, sql: &str) -> String {
    let err = client.batch_execute(sql).await.unwrap_err();
    err.code().map(|c| c.code().to_string()).unwrap_or_default()
}

async fn create_room(admin: &Client, name: &str, capacity: u32) -> Ulid {
    let id = Ulid::new();
    admin
        .batch_execute(&format!(
            "INSERT INTO spaces (id, name, type, capacity) VALUES ('{id}', '{name}', 'meeting_room', {capacity})"
        ))
        .await
        .unwrap();
    id
}

fn insert_booking(id: Ulid, space: Ulid, start: &str, end: &str) -> String {
    format!(
        "INSERT INTO bookings (id, space_id, date, start_time, end_time) VALUES ('{id}', '{space}', '{DAY}', '{start}', '{end}')"
    )
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn admin_creates_space_users_list_it() {
    let addr = start_test_server(BookingWorkflow::Direct).await;
    let admin = connect(addr, "admin").await;
    let alice = connect(addr, "alice").await;

    let sid = create_room(&admin, "Everest", 8).await;

    let spaces = rows(&alice, "SELECT * FROM spaces").await;
    assert_eq!(spaces.len(), 1);
    assert_eq!(spaces[0].get("id"), Some(sid.to_string().as_str()));
    assert_eq!(spaces[0].get("name"), Some("Everest"));
    assert_eq!(spaces[0].get("capacity"), Some("8"));

    let types = rows(&alice, "SELECT * FROM space_types").await;
    assert_eq!(types.len(), 1);
    assert_eq!(types[0].get("type"), Some("meeting_room"));
}

#[tokio::test]
async fn non_admin_cannot_manage_spaces() {
    let addr = start_test_server(BookingWorkflow::Direct).await;
    let alice = connect(addr, "alice").await;

    let id = Ulid::new();
    let code = sqlstate(
        &alice,
        &format!("INSERT INTO spaces (id, name, type, capacity) VALUES ('{id}', 'Mine', 'desk', 1)"),
    )
    .await;
    assert_eq!(code, "42501");
}

#[tokio::test]
async fn booking_conflict_reported_with_sqlstate() {
    let addr = start_test_server(BookingWorkflow::Direct).await;
    let admin = connect(addr, "admin").await;
    let alice = connect(addr, "alice").await;
    let bob = connect(addr, "bob").await;
    let sid = create_room(&admin, "A", 8).await;

    alice
        .batch_execute(&insert_booking(Ulid::new(), sid, "09:00", "10:00"))
        .await
        .unwrap();

    // Touching the end boundary still conflicts.
    let code = sqlstate(&bob, &insert_booking(Ulid::new(), sid, "10:00", "11:00")).await;
    assert_eq!(code, "23P01");

    bob.batch_execute(&insert_booking(Ulid::new(), sid, "10:01", "11:00"))
        .await
        .unwrap();

    let code = sqlstate(&bob, &insert_booking(Ulid::new(), sid, "12:00", "12:29")).await;
    assert_eq!(code, "22008");
}

#[tokio::test]
async fn booking_lifecycle_over_the_wire() {
    let addr = start_test_server(BookingWorkflow::Direct).await;
    let admin = connect(addr, "admin").await;
    let alice = connect(addr, "alice").await;
    let bob = connect(addr, "bob").await;
    let sid = create_room(&admin, "A", 8).await;

    let bid = Ulid::new();
    alice
        .batch_execute(&insert_booking(bid, sid, "09:00", "10:00"))
        .await
        .unwrap();

    let mine = rows(&alice, &format!("SELECT * FROM bookings WHERE id = '{bid}'")).await;
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].get("status"), Some("confirmed"));
    assert_eq!(mine[0].get("space_name"), Some("A"));
    assert_eq!(mine[0].get("start_time"), Some("09:00"));
    assert_eq!(mine[0].get("duration_minutes"), Some("60"));

    // Someone else's booking is off limits.
    let code = sqlstate(&bob, &format!("SELECT * FROM bookings WHERE id = '{bid}'")).await;
    assert_eq!(code, "42501");

    alice
        .batch_execute(&format!(
            "UPDATE bookings SET start_time = '11:00', end_time = '12:30' WHERE id = '{bid}'"
        ))
        .await
        .unwrap();
    let moved = rows(&alice, &format!("SELECT * FROM bookings WHERE id = '{bid}'")).await;
    assert_eq!(moved[0].get("end_time"), Some("12:30"));

    alice
        .batch_execute(&format!("UPDATE bookings SET status = 'cancelled' WHERE id = '{bid}'"))
        .await
        .unwrap();
    let code = sqlstate(
        &alice,
        &format!("UPDATE bookings SET status = 'cancelled' WHERE id = '{bid}'"),
    )
    .await;
    assert_eq!(code, "55000");

    let listed = rows(&alice, "SELECT * FROM bookings WHERE status = 'cancelled'").await;
    assert_eq!(listed.len(), 1);

    // Cancelled bookings drop out of the space calendar.
    let calendar = rows(
        &alice,
        &format!("SELECT * FROM bookings WHERE space_id = '{sid}' AND date >= '{DAY}' AND date <= '{DAY}'"),
    )
    .await;
    assert!(calendar.is_empty());

    alice
        .batch_execute(&format!("DELETE FROM bookings WHERE id = '{bid}'"))
        .await
        .unwrap();
    let code = sqlstate(&alice, &format!("SELECT * FROM bookings WHERE id = '{bid}'")).await;
    assert_eq!(code, "02000");
}

#[tokio::test]
async fn availability_queries() {
    let addr = start_test_server(BookingWorkflow::Direct).await;
    let admin = connect(addr, "admin").await;
    let alice = connect(addr, "alice").await;

    let sid = Ulid::new();
    // 2099-03-10 is a Tuesday.
    admin
        .batch_execute(&format!(
            r#"INSERT INTO spaces (id, name, type, capacity, available_hours) VALUES ('{sid}', 'A', 'meeting_room', 4, '{{"tuesday": {{"start": "08:00", "end": "18:00"}}}}')"#
        ))
        .await
        .unwrap();
    let bid = Ulid::new();
    alice
        .batch_execute(&insert_booking(bid, sid, "09:00", "10:00"))
        .await
        .unwrap();

    let windows = rows(
        &alice,
        &format!("SELECT * FROM availability WHERE space_id = '{sid}' AND date = '{DAY}'"),
    )
    .await;
    let spans: Vec<_> = windows
        .iter()
        .map(|r| (r.get("start_time").unwrap().to_string(), r.get("end_time").unwrap().to_string()))
        .collect();
    assert_eq!(
        spans,
        vec![
            ("08:00".to_string(), "08:59".to_string()),
            ("10:01".to_string(), "18:00".to_string()),
        ]
    );

    let check = rows(
        &alice,
        &format!(
            "SELECT * FROM availability WHERE space_id = '{sid}' AND date = '{DAY}' AND start_time = '10:00' AND end_time = '11:00'"
        ),
    )
    .await;
    assert_eq!(check.len(), 1);
    assert_eq!(check[0].get("conflicting_booking_id"), Some(bid.to_string().as_str()));
}

#[tokio::test]
async fn approval_requires_admin_confirmation() {
    let addr = start_test_server(BookingWorkflow::Approval).await;
    let admin = connect(addr, "admin").await;
    let alice = connect(addr, "alice").await;
    let sid = create_room(&admin, "A", 8).await;

    let bid = Ulid::new();
    alice
        .batch_execute(&insert_booking(bid, sid, "09:00", "10:00"))
        .await
        .unwrap();
    let pending = rows(&alice, &format!("SELECT * FROM bookings WHERE id = '{bid}'")).await;
    assert_eq!(pending[0].get("status"), Some("pending"));

    let confirm = format!("UPDATE bookings SET status = 'confirmed' WHERE id = '{bid}'");
    assert_eq!(sqlstate(&alice, &confirm).await, "42501");
    admin.batch_execute(&confirm).await.unwrap();

    let confirmed = rows(&alice, &format!("SELECT * FROM bookings WHERE id = '{bid}'")).await;
    assert_eq!(confirmed[0].get("status"), Some("confirmed"));
}

#[tokio::test]
async fn extended_protocol_binds_parameters() {
    let addr = start_test_server(BookingWorkflow::Direct).await;
    let admin = connect(addr, "admin").await;
    let alice = connect(addr, "alice").await;
    let sid = create_room(&admin, "A", 8).await;

    let bid = Ulid::new().to_string();
    let space = sid.to_string();
    let inserted = alice
        .execute(
            "INSERT INTO bookings (id, space_id, date, start_time, end_time, purpose) VALUES ($1, $2, $3, $4, $5, $6)",
            &[&bid, &space, &DAY, &"14:00", &"15:00", &"quarterly review"],
        )
        .await
        .unwrap();
    assert_eq!(inserted, 1);

    let mine = rows(&alice, &format!("SELECT * FROM bookings WHERE id = '{bid}'")).await;
    assert_eq!(mine[0].get("purpose"), Some("quarterly review"));
}

#[tokio::test]
async fn syntax_errors_are_reported() {
    let addr = start_test_server(BookingWorkflow::Direct).await;
    let alice = connect(addr, "alice").await;
    assert_eq!(sqlstate(&alice, "SELECT * FROM rooms").await, "42601");
    assert_eq!(sqlstate(&alice, "DROP TABLE bookings").await, "42601");
}
