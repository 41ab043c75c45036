//! Integration-Tests fuer den Worker-Link (Nachbau-Proxy ueber echtes TCP)

use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tonmeister_core::types::KanalId;
use tonmeister_node::{LinkKonfiguration, PlatzhalterEngine, WorkerLink};
use tonmeister_protocol::control::{KanalOeffnenOptionen, KommandoNachricht, WorkerNachricht};
use tonmeister_protocol::wire::{frame_lesen, frame_schreiben};

/// Startet einen Link gegen einen Nachbau-Proxy und gibt Listener plus
/// Shutdown-Sender zurueck
async fn link_hochfahren(
    engine: &PlatzhalterEngine,
    instanz: &str,
) -> (TcpListener, watch::Sender<bool>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Listener bindet");
    let adresse = listener.local_addr().unwrap();

    let mut konfig = LinkKonfiguration::neu(adresse.to_string(), instanz);
    konfig.wiederverbindung = Duration::from_millis(50);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let link = WorkerLink::neu(konfig, Arc::new(engine.clone()));
    tokio::spawn(link.starten(shutdown_rx));

    (listener, shutdown_tx)
}

/// Nimmt die Verbindung des Links an und liest den Handshake weg
async fn verbunden(listener: &TcpListener) -> (TcpStream, WorkerNachricht) {
    let (mut stream, _) = listener.accept().await.expect("Link verbindet sich");
    let handshake: WorkerNachricht = frame_lesen(&mut stream)
        .await
        .expect("Handshake kommt als erster Frame");
    (stream, handshake)
}

#[tokio::test]
async fn handshake_ist_ein_reiner_status_frame() {
    let engine = PlatzhalterEngine::neu("127.0.0.1", 42000, 4);
    let (listener, _shutdown) = link_hochfahren(&engine, "knoten-1").await;

    let (_stream, handshake) = verbunden(&listener).await;
    assert!(handshake.ist_status_meldung());

    let status = handshake.status.expect("Handshake traegt Status");
    assert_eq!(status.instance, "knoten-1");
    assert_eq!(status.worker_count, 1);
    assert_eq!(status.channel.available, 4);
    assert_eq!(status.channel.current, 0);
}

#[tokio::test]
async fn open_wird_mit_huckepack_status_bestaetigt() {
    let engine = PlatzhalterEngine::neu("127.0.0.1", 42100, 4);
    let (listener, _shutdown) = link_hochfahren(&engine, "knoten-2").await;
    let (mut stream, _) = verbunden(&listener).await;

    let id = KanalId::new();
    frame_schreiben(
        &mut stream,
        &KommandoNachricht::open(id, KanalOeffnenOptionen::default()),
    )
    .await
    .unwrap();

    let antwort: WorkerNachricht = frame_lesen(&mut stream).await.unwrap();
    assert_eq!(antwort.aktion(), Some("open"));
    assert_eq!(antwort.id, Some(id));
    assert!(antwort.uuid.is_some());

    let lokal = antwort.local.expect("Bestaetigung traegt Adresse");
    assert_eq!(lokal.address, "127.0.0.1");
    assert_eq!(lokal.port, 42100);

    let status = antwort.status.expect("Jede Antwort traegt Status");
    assert_eq!(status.channel.current, 1);
}

#[tokio::test]
async fn unbekannte_aktion_ergibt_unknown_method() {
    let engine = PlatzhalterEngine::neu("127.0.0.1", 42200, 4);
    let (listener, _shutdown) = link_hochfahren(&engine, "knoten-3").await;
    let (mut stream, _) = verbunden(&listener).await;

    let id = KanalId::new();
    let fremd = serde_json::json!({ "channel": "transcode", "id": id });
    frame_schreiben(&mut stream, &fremd).await.unwrap();

    let antwort: WorkerNachricht = frame_lesen(&mut stream).await.unwrap();
    assert_eq!(antwort.aktion(), Some("error"));
    assert_eq!(antwort.error.as_deref(), Some("Unknown method"));
    assert_eq!(antwort.id, Some(id));

    // Der Link bleibt danach voll funktionsfaehig
    let offen = KanalId::new();
    frame_schreiben(
        &mut stream,
        &KommandoNachricht::open(offen, KanalOeffnenOptionen::default()),
    )
    .await
    .unwrap();
    let bestaetigung: WorkerNachricht = frame_lesen(&mut stream).await.unwrap();
    assert_eq!(bestaetigung.aktion(), Some("open"));
    assert_eq!(bestaetigung.id, Some(offen));
}

#[tokio::test]
async fn close_meldet_grund_und_statistik() {
    let engine = PlatzhalterEngine::neu("127.0.0.1", 42300, 4);
    let (listener, _shutdown) = link_hochfahren(&engine, "knoten-4").await;
    let (mut stream, _) = verbunden(&listener).await;

    let id = KanalId::new();
    frame_schreiben(
        &mut stream,
        &KommandoNachricht::open(id, KanalOeffnenOptionen::default()),
    )
    .await
    .unwrap();
    let bestaetigung: WorkerNachricht = frame_lesen(&mut stream).await.unwrap();
    let uuid = bestaetigung.uuid;

    frame_schreiben(&mut stream, &KommandoNachricht::close(id, uuid))
        .await
        .unwrap();

    let geschlossen: WorkerNachricht = frame_lesen(&mut stream).await.unwrap();
    assert_eq!(geschlossen.aktion(), Some("close"));
    assert_eq!(geschlossen.id, Some(id));
    assert_eq!(geschlossen.rest["reason"], "close");
    assert_eq!(geschlossen.rest["stats"]["in"], 0);
    assert_eq!(geschlossen.rest["stats"]["out"], 0);
    assert_eq!(geschlossen.rest["stats"]["tick"], 0);

    let status = geschlossen.status.expect("Status haengt dran");
    assert_eq!(status.channel.current, 0);
    assert_eq!(engine.zaehler().schliessen, 1);
}

#[tokio::test]
async fn erschoepfte_kapazitaet_meldet_sich_als_close() {
    let engine = PlatzhalterEngine::neu("127.0.0.1", 42400, 1);
    let (listener, _shutdown) = link_hochfahren(&engine, "knoten-5").await;
    let (mut stream, _) = verbunden(&listener).await;

    let erster = KanalId::new();
    frame_schreiben(
        &mut stream,
        &KommandoNachricht::open(erster, KanalOeffnenOptionen::default()),
    )
    .await
    .unwrap();
    let _: WorkerNachricht = frame_lesen(&mut stream).await.unwrap();

    let zweiter = KanalId::new();
    frame_schreiben(
        &mut stream,
        &KommandoNachricht::open(zweiter, KanalOeffnenOptionen::default()),
    )
    .await
    .unwrap();

    let abgelehnt: WorkerNachricht = frame_lesen(&mut stream).await.unwrap();
    assert_eq!(abgelehnt.aktion(), Some("close"));
    assert_eq!(abgelehnt.id, Some(zweiter));
    assert!(abgelehnt.uuid.is_none());
    assert!(abgelehnt.rest["reason"]
        .as_str()
        .unwrap()
        .contains("erschoepft"));
    assert_eq!(abgelehnt.rest["stats"]["tick"], 0);
}

#[tokio::test]
async fn kommandos_laufen_bis_zur_engine_durch() {
    let engine = PlatzhalterEngine::neu("127.0.0.1", 42500, 4);
    let (listener, _shutdown) = link_hochfahren(&engine, "knoten-6").await;
    let (mut stream, _) = verbunden(&listener).await;

    let id = KanalId::new();
    frame_schreiben(
        &mut stream,
        &KommandoNachricht::open(id, KanalOeffnenOptionen::default()),
    )
    .await
    .unwrap();
    let bestaetigung: WorkerNachricht = frame_lesen(&mut stream).await.unwrap();
    let uuid = bestaetigung.uuid;

    frame_schreiben(&mut stream, &KommandoNachricht::dtmf(id, uuid, "42#"))
        .await
        .unwrap();
    frame_schreiben(&mut stream, &KommandoNachricht::echo(id, uuid))
        .await
        .unwrap();
    frame_schreiben(
        &mut stream,
        &KommandoNachricht::play(id, uuid, serde_json::json!({ "file": "ansage.wav" })),
    )
    .await
    .unwrap();

    // Fire-and-Forget-Kommandos erzeugen keine Antwort; auf die Zaehler warten
    for _ in 0..100 {
        if engine.zaehler().abspielen == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let stand = engine.zaehler();
    assert_eq!(stand.dtmf, 1);
    assert_eq!(stand.echo, 1);
    assert_eq!(stand.abspielen, 1);
}

#[tokio::test]
async fn wiederverbindung_behaelt_den_kanalbestand() {
    let engine = PlatzhalterEngine::neu("127.0.0.1", 42600, 4);
    let (listener, _shutdown) = link_hochfahren(&engine, "knoten-7").await;
    let (mut stream, _) = verbunden(&listener).await;

    let id = KanalId::new();
    frame_schreiben(
        &mut stream,
        &KommandoNachricht::open(id, KanalOeffnenOptionen::default()),
    )
    .await
    .unwrap();
    let bestaetigung: WorkerNachricht = frame_lesen(&mut stream).await.unwrap();
    let uuid = bestaetigung.uuid;

    // Verbindungsabriss: der Link verbindet sich von selbst neu
    drop(stream);
    let (mut stream, handshake) = verbunden(&listener).await;

    // Der offene Kanal hat den Abriss ueberlebt
    let status = handshake.status.expect("Handshake traegt Status");
    assert_eq!(status.instance, "knoten-7");
    assert_eq!(status.channel.current, 1);

    // Und laesst sich ueber die neue Verbindung schliessen
    frame_schreiben(&mut stream, &KommandoNachricht::close(id, uuid))
        .await
        .unwrap();
    let geschlossen: WorkerNachricht = frame_lesen(&mut stream).await.unwrap();
    assert_eq!(geschlossen.aktion(), Some("close"));
    assert_eq!(geschlossen.id, Some(id));
    assert_eq!(geschlossen.status.unwrap().channel.current, 0);
}

#[tokio::test]
async fn shutdown_beendet_den_link() {
    let engine = PlatzhalterEngine::neu("127.0.0.1", 42700, 4);
    let (listener, shutdown_tx) = link_hochfahren(&engine, "knoten-8").await;
    let (mut stream, _) = verbunden(&listener).await;

    shutdown_tx.send(true).unwrap();

    // Der Link schliesst die Verbindung und verbindet sich nicht neu
    let ende: std::io::Result<WorkerNachricht> = frame_lesen(&mut stream).await;
    assert!(ende.is_err(), "Stream muss enden");

    let wieder = tokio::time::timeout(Duration::from_millis(300), listener.accept()).await;
    assert!(wieder.is_err(), "Keine Wiederverbindung nach Shutdown");
}
