use std::time::Duration;

use futures::StreamExt;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use hausflow_bridge::Gateway;
use hausflow_core::config::Config;
use hausflow_core::types::{DeviceDescriptor, DeviceKind, MacAddress};
use hausflow_devices::devices::clipsal::LIGHT_BEACON_TYPE;
use hausflow_devices::FRAME_LEN;

const LIGHT: MacAddress = MacAddress::new([0x00, 0x0d, 0x6f, 0xc6, 0xaa, 0xf5]);
const GARAGE: MacAddress = MacAddress::new([0x00, 0x0d, 0x6f, 0x00, 0x00, 0x01]);

fn config() -> Config {
    let mut config = Config::default();
    let local = "127.0.0.1:0".parse().unwrap();
    config.beacon.bind_addr = local;
    config.bridge.action_addr = local;
    config.bridge.push_addr = local;
    config.bridge.agent_user_id = "tester".into();
    config.daikin.discovery_enabled = false;
    config.reporting.enabled = false;
    config.devices = vec![
        DeviceDescriptor::new(LIGHT, DeviceKind::ClipsalLight, "Ensuite"),
        DeviceDescriptor::new(GARAGE, DeviceKind::Garage, "Garage"),
    ];
    config
}

fn light_frame(on: bool, brightness: u8) -> [u8; FRAME_LEN] {
    let mut frame = [0u8; FRAME_LEN];
    frame[..6].copy_from_slice(LIGHT.as_bytes());
    frame[6] = LIGHT_BEACON_TYPE;
    frame[7] = u8::from(on);
    frame[8] = brightness;
    frame
}

async fn wait_until(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

async fn action(gateway: &Gateway, intent: &str, payload: Value) -> Value {
    reqwest::Client::new()
        .post(format!("http://{}/", gateway.action_addr()))
        .json(&json!({
            "requestId": "it-1",
            "inputs": [{"intent": intent, "payload": payload}],
        }))
        .send()
        .await
        .unwrap()
        .json::<Value>()
        .await
        .unwrap()
}

async fn connect_relay(gateway: &Gateway) -> TcpStream {
    let relay = TcpStream::connect(gateway.beacon_addr()).await.unwrap();
    wait_until(|| gateway.relay_count() == 1).await;
    relay
}

#[test_log::test(tokio::test)]
async fn test_sync_and_query_follow_beacons() {
    let gateway = Gateway::start(&config()).await.unwrap();

    let sync = action(&gateway, "action.devices.SYNC", Value::Null).await;
    assert_eq!(sync["requestId"], json!("it-1"));
    assert_eq!(sync["payload"]["agentUserId"], json!("tester"));
    let ids: Vec<&str> = sync["payload"]["devices"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, ["00:0d:6f:c6:aa:f5", "00:0d:6f:00:00:01"]);

    let query = json!({"devices": [{"id": LIGHT.to_string()}, {"id": "ff:ff:ff:ff:ff:ff"}]});
    let before = action(&gateway, "action.devices.QUERY", query.clone()).await;
    assert_eq!(
        before["payload"]["devices"][LIGHT.to_string()],
        json!({"status": "OFFLINE", "online": false})
    );
    assert_eq!(
        before["payload"]["devices"]["ff:ff:ff:ff:ff:ff"],
        json!({"status": "ERROR", "errorCode": "unableToLocateDevice"})
    );

    let mut relay = connect_relay(&gateway).await;
    let mut changes = gateway.registry().subscribe();
    relay.write_all(&light_frame(true, 128)).await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), changes.recv())
        .await
        .unwrap()
        .unwrap();

    let after = action(&gateway, "action.devices.QUERY", query).await;
    assert_eq!(
        after["payload"]["devices"][LIGHT.to_string()],
        json!({"status": "SUCCESS", "online": true, "on": true, "brightness": 128})
    );

    gateway.shutdown();
}

#[test_log::test(tokio::test)]
async fn test_execute_round_trips_through_relay() {
    let gateway = Gateway::start(&config()).await.unwrap();
    let mut relay = connect_relay(&gateway).await;
    relay.write_all(&light_frame(false, 30)).await.unwrap();

    let registry = gateway.registry().clone();
    tokio::time::timeout(Duration::from_secs(5), async {
        while !registry.get_state(&LIGHT).await.unwrap().online {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    let payload = json!({"commands": [
        {
            "devices": [{"id": LIGHT.to_string()}, {"id": GARAGE.to_string()}],
            "execution": [{"command": "action.devices.commands.OnOff", "params": {"on": true}}],
        },
        {
            "devices": [{"id": LIGHT.to_string()}],
            "execution": [{"command": "action.devices.commands.BrightnessAbsolute", "params": {"brightness": 200}}],
        },
    ]});
    let addr = gateway.action_addr();
    let request = tokio::spawn(async move {
        reqwest::Client::new()
            .post(format!("http://{addr}/"))
            .json(&json!({
                "requestId": "it-2",
                "inputs": [{"intent": "action.devices.EXECUTE", "payload": payload}],
            }))
            .send()
            .await
            .unwrap()
            .json::<Value>()
            .await
            .unwrap()
    });

    // Both commands for the light arrive in one frame; answer like the light.
    let mut command = [0u8; FRAME_LEN];
    relay.read_exact(&mut command).await.unwrap();
    assert_eq!(&command[..6], LIGHT.as_bytes());
    assert_eq!(&command[6..9], &[LIGHT_BEACON_TYPE, 1, 200]);
    relay.write_all(&light_frame(true, 200)).await.unwrap();

    let response = tokio::time::timeout(Duration::from_secs(10), request)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response["requestId"], json!("it-2"));
    assert_eq!(
        response["payload"]["commands"],
        json!([
            {"ids": [LIGHT.to_string()], "status": "SUCCESS", "online": true, "on": true, "brightness": 200},
            {"ids": [GARAGE.to_string()], "status": "OFFLINE", "online": false},
        ])
    );

    gateway.shutdown();
}

#[test_log::test(tokio::test)]
async fn test_push_channel_forwards_changes() {
    let gateway = Gateway::start(&config()).await.unwrap();
    let mut relay = connect_relay(&gateway).await;

    let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{}/", gateway.push_addr()))
        .await
        .unwrap();
    let registry = gateway.registry().clone();
    wait_until(|| registry.changes().subscriber_count() == 1).await;

    relay.write_all(&light_frame(true, 64)).await.unwrap();

    let message = tokio::time::timeout(Duration::from_secs(5), socket.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let value: Value = serde_json::from_str(message.to_text().unwrap()).unwrap();
    assert_eq!(
        value,
        json!({"id": LIGHT.to_string(), "state": {"online": true, "on": true, "brightness": 64}})
    );

    drop(socket);
    wait_until(|| registry.changes().subscriber_count() == 0).await;

    gateway.shutdown();
}

#[test_log::test(tokio::test)]
async fn test_push_channel_skips_repeated_updates() {
    let gateway = Gateway::start(&config()).await.unwrap();
    let mut relay = connect_relay(&gateway).await;

    let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{}/", gateway.push_addr()))
        .await
        .unwrap();
    let registry = gateway.registry().clone();
    wait_until(|| registry.changes().subscriber_count() == 1).await;

    // Two identical beacons followed by a real change
    relay.write_all(&light_frame(true, 64)).await.unwrap();
    relay.write_all(&light_frame(true, 64)).await.unwrap();
    relay.write_all(&light_frame(true, 90)).await.unwrap();

    let mut brightness = Vec::new();
    for _ in 0..2 {
        let message = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let value: Value = serde_json::from_str(message.to_text().unwrap()).unwrap();
        brightness.push(value["state"]["brightness"].clone());
    }
    assert_eq!(brightness, [json!(64), json!(90)]);

    // Nothing else is queued behind the change
    let extra = tokio::time::timeout(Duration::from_millis(200), socket.next()).await;
    assert!(extra.is_err());

    gateway.shutdown();
}
