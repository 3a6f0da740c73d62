use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use flow_api::{DataType, ErrorKind, Message, Operator, StreamDecl, StreamView, Timestamp, Value};
use flow_engine::{EngineConfig, EngineError, OperatorOutputs, OverflowPolicy, Pipeline, Stream};
use flow_record::{
    Manifest, ManifestEntry, Player, PlayerConfig, RecordWriter, Recorder, RecorderConfig,
    ReplayStatus,
};
use proptest::prelude::*;
use tokio_util::sync::CancellationToken;

fn player(path: &Path, frequency: Option<f64>) -> Player {
    Player::new(
        "replay",
        PlayerConfig {
            filename: path.to_path_buf(),
            frequency,
        },
    )
}

/// Feed `messages` (stream index, message) through ingresses into a recorder
/// that keeps every stream.
async fn record_all(path: &Path, streams: &[StreamDecl], messages: Vec<(usize, Message)>) {
    let mut pipeline = Pipeline::new(EngineConfig::default());
    let mut ingresses = Vec::new();
    for decl in streams {
        ingresses.push(pipeline.add_ingress(decl.clone()).unwrap());
    }
    let names: Vec<&str> = streams.iter().map(|d| d.name.as_str()).collect();
    let recorder = Recorder::new(
        "rec",
        RecorderConfig {
            filename: path.to_path_buf(),
            filter: Vec::new(),
        },
    );
    pipeline.add_operator(recorder, &names).await.unwrap();
    let running = pipeline.start(CancellationToken::new());

    for (i, msg) in messages {
        ingresses[i].send(msg).await.unwrap();
    }
    for ingress in &ingresses {
        ingress.close().await;
    }
    running.join().await.unwrap();
}

/// `a` (int) and `b` (str): `(1, t1) -> a`, `("x", t2) -> b`, `(2, t3) -> a`.
async fn record_scenario(dir: &Path) -> PathBuf {
    let path = dir.join("scenario.bin");
    let streams = [StreamDecl::new("a", DataType::Int), StreamDecl::new("b", DataType::Str)];
    let messages = vec![
        (0, Message::new(1i64, 1u64)),
        (1, Message::new("x", 2u64)),
        (0, Message::new(2i64, 3u64)),
    ];
    record_all(&path, &streams, messages).await;
    path
}

/// Player set up outside an engine, with live output streams to observe.
async fn standalone(player: &mut Player) -> (OperatorOutputs, Vec<(String, flow_engine::Subscription)>) {
    let setup = player.setup(StreamView::empty()).unwrap();
    let mut streams = Vec::new();
    let mut subs = Vec::new();
    for decl in setup.outputs {
        let stream = Arc::new(Stream::new(decl.clone()));
        subs.push((decl.name, stream.subscribe(64, OverflowPolicy::BackPressure).await));
        streams.push(stream);
    }
    (OperatorOutputs::new("replay", streams), subs)
}

#[tokio::test]
async fn replays_streams_in_recorded_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = record_scenario(dir.path()).await;

    let mut replay = player(&path, None);
    let (ctx, _subs) = standalone(&mut replay).await;
    assert_eq!(
        replay.manifest().to_streams(),
        vec![StreamDecl::new("a", DataType::Int), StreamDecl::new("b", DataType::Str)]
    );

    let mut order = Vec::new();
    loop {
        match replay.publish_next(&ctx).await.unwrap() {
            ReplayStatus::Published(stream) => order.push(stream),
            ReplayStatus::Exhausted => break,
        }
    }
    assert_eq!(order, ["a", "b", "a"]);

    // End of file is terminal and quiet.
    for _ in 0..3 {
        assert_eq!(replay.publish_next(&ctx).await.unwrap(), ReplayStatus::Exhausted);
    }
}

#[tokio::test]
async fn round_trip_through_pipelines() {
    let dir = tempfile::tempdir().unwrap();
    let path = record_scenario(dir.path()).await;

    let mut pipeline = Pipeline::new(EngineConfig::default());
    let outputs = pipeline.add_operator(player(&path, None), &[]).await.unwrap();
    assert_eq!(outputs.len(), 2);
    let a = pipeline.subscribe("a").await.unwrap();
    let b = pipeline.subscribe("b").await.unwrap();
    let running = pipeline.start(CancellationToken::new());

    let a: Vec<(Value, u64)> = a
        .collect()
        .await
        .into_iter()
        .map(|m| (m.payload, m.timestamp.coordinates()[0]))
        .collect();
    let b: Vec<(Value, u64)> = b
        .collect()
        .await
        .into_iter()
        .map(|m| (m.payload, m.timestamp.coordinates()[0]))
        .collect();
    running.join().await.unwrap();

    assert_eq!(a, vec![(Value::Int(1), 1), (Value::Int(2), 3)]);
    assert_eq!(b, vec![(Value::from("x"), 2)]);
}

#[tokio::test(start_paused = true)]
async fn cadence_spaces_emissions() {
    let dir = tempfile::tempdir().unwrap();
    let path = record_scenario(dir.path()).await;

    let mut pipeline = Pipeline::new(EngineConfig::default());
    pipeline.add_operator(player(&path, Some(10.0)), &[]).await.unwrap();
    let mut a = pipeline.subscribe("a").await.unwrap();
    let start = tokio::time::Instant::now();
    let running = pipeline.start(CancellationToken::new());

    let first = a.recv().await.unwrap();
    let first_at = start.elapsed();
    let second = a.recv().await.unwrap();
    let second_at = start.elapsed();
    assert!(a.recv().await.is_none());
    running.join().await.unwrap();

    assert_eq!(first.payload, Value::Int(1));
    assert_eq!(second.payload, Value::Int(2));
    // The message on `b` takes the tick in between.
    assert!(second_at - first_at >= Duration::from_millis(200));
}

#[tokio::test]
async fn unknown_stream_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.bin");
    let mut writer = RecordWriter::create(&path).unwrap();
    writer
        .write_manifest(
            &Manifest::new(vec![ManifestEntry {
                data_type: DataType::Int,
                name: "a".into(),
            }])
            .unwrap(),
        )
        .unwrap();
    let mut stray = Message::new(1i64, 1u64);
    stray.stream = "zzz".into();
    writer.write_message(&stray).unwrap();
    drop(writer);

    let mut pipeline = Pipeline::new(EngineConfig::default());
    pipeline.add_operator(player(&path, None), &[]).await.unwrap();
    let err = pipeline
        .start(CancellationToken::new())
        .join()
        .await
        .unwrap_err();
    match err {
        EngineError::Operator { operator, source } => {
            assert_eq!(operator, "replay");
            assert_eq!(source.kind(), ErrorKind::Format);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn mistyped_payload_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("typed.bin");
    let mut writer = RecordWriter::create(&path).unwrap();
    writer
        .write_manifest(
            &Manifest::new(vec![ManifestEntry {
                data_type: DataType::Int,
                name: "a".into(),
            }])
            .unwrap(),
        )
        .unwrap();
    let mut wrong = Message::new("not an int", 1u64);
    wrong.stream = "a".into();
    writer.write_message(&wrong).unwrap();
    drop(writer);

    let mut replay = player(&path, None);
    let (ctx, _subs) = standalone(&mut replay).await;
    let err = replay.publish_next(&ctx).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Format);
}

#[tokio::test]
async fn truncated_recording_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = record_scenario(dir.path()).await;
    let file = OpenOptions::new().write(true).open(&path).unwrap();
    let len = file.metadata().unwrap().len();
    file.set_len(len - 3).unwrap();
    drop(file);

    let mut replay = player(&path, None);
    let (ctx, _subs) = standalone(&mut replay).await;
    assert_eq!(
        replay.publish_next(&ctx).await.unwrap(),
        ReplayStatus::Published("a".into())
    );
    assert_eq!(
        replay.publish_next(&ctx).await.unwrap(),
        ReplayStatus::Published("b".into())
    );
    let err = replay.publish_next(&ctx).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Format);
}

#[tokio::test]
async fn recorder_filter_limits_what_replays() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("only_b.bin");

    let mut pipeline = Pipeline::new(EngineConfig::default());
    let a = pipeline.add_ingress(StreamDecl::new("a", DataType::Int)).unwrap();
    let b = pipeline.add_ingress(StreamDecl::new("b", DataType::Str)).unwrap();
    let recorder = Recorder::new(
        "rec",
        RecorderConfig {
            filename: path.clone(),
            filter: vec!["b".into()],
        },
    );
    pipeline.add_operator(recorder, &["a", "b"]).await.unwrap();
    let running = pipeline.start(CancellationToken::new());
    a.send(Message::new(1i64, 1u64)).await.unwrap();
    b.send(Message::new("y", 2u64)).await.unwrap();
    a.close().await;
    b.close().await;
    running.join().await.unwrap();

    let mut replay = player(&path, None);
    let setup = replay.setup(StreamView::empty()).unwrap();
    assert_eq!(setup.outputs, vec![StreamDecl::new("b", DataType::Str)]);
}

fn payload() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Int),
        (-1e12f64..1e12).prop_map(Value::Float),
        ".{0,8}".prop_map(Value::Str),
        prop::collection::vec(any::<u8>(), 0..8).prop_map(Value::Bytes),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::List),
            prop::collection::vec(inner, 0..4).prop_map(Value::Tuple),
        ]
    })
}

/// Stream count, then messages as (stream index, payload, timestamp).
fn recording() -> impl Strategy<Value = (usize, Vec<(usize, Value, Vec<u64>)>)> {
    (1usize..4).prop_flat_map(|k| {
        let msg = (0..k, payload(), prop::collection::vec(any::<u64>(), 1..4));
        (Just(k), prop::collection::vec(msg, 0..30))
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn replay_preserves_each_stream((k, msgs) in recording()) {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let (expected, replayed) = rt.block_on(async {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("any.bin");
            let streams: Vec<StreamDecl> =
                (0..k).map(|i| StreamDecl::new(format!("s{i}"), DataType::Any)).collect();

            let mut expected = vec![Vec::new(); k];
            let mut messages = Vec::new();
            for (i, value, coords) in msgs {
                expected[i].push((value.clone(), Timestamp::new(coords.clone())));
                messages.push((i, Message::new(value, coords)));
            }
            record_all(&path, &streams, messages).await;

            let mut pipeline = Pipeline::new(EngineConfig::default());
            pipeline.add_operator(player(&path, None), &[]).await.unwrap();
            let mut subs = Vec::new();
            for decl in &streams {
                subs.push(pipeline.subscribe(&decl.name).await.unwrap());
            }
            let running = pipeline.start(CancellationToken::new());
            running.join().await.unwrap();

            let mut replayed = Vec::new();
            for sub in subs {
                let got: Vec<(Value, Timestamp)> =
                    sub.collect().await.into_iter().map(|m| (m.payload, m.timestamp)).collect();
                replayed.push(got);
            }
            (expected, replayed)
        });
        prop_assert_eq!(replayed, expected);
    }
}
