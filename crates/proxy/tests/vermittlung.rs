//! Integration-Tests fuer die Vermittlung (Proxy und echte Worker ueber TCP)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tonmeister_core::TonmeisterFehler;
use tonmeister_node::{LinkKonfiguration, PlatzhalterEngine, WorkerLink};
use tonmeister_protocol::control::{KanalOeffnenOptionen, WorkerNachricht};
use tonmeister_proxy::{KanalProxy, KanalTabelle, ProxyServer, WorkerRegistry};

struct Pruefstand {
    registry: WorkerRegistry,
    tabelle: KanalTabelle,
    adresse: SocketAddr,
    _shutdown_tx: watch::Sender<bool>,
}

/// Bindet einen Proxy auf Port 0 und startet seinen Accept-Loop
async fn proxy_hochfahren() -> Pruefstand {
    let registry = WorkerRegistry::neu();
    let tabelle = KanalTabelle::neu(registry.clone());
    let server = ProxyServer::binden(
        registry.clone(),
        tabelle.clone(),
        "127.0.0.1:0".parse().unwrap(),
    )
    .await
    .expect("Proxy bindet");
    let adresse = server.lokale_adresse().unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(server.starten(shutdown_rx));

    Pruefstand {
        registry,
        tabelle,
        adresse,
        _shutdown_tx: shutdown_tx,
    }
}

/// Startet einen echten Worker-Link gegen den Proxy
fn worker_hochfahren(
    stand: &Pruefstand,
    instanz: &str,
    basis_port: u16,
    max_kanaele: u32,
) -> (PlatzhalterEngine, watch::Sender<bool>) {
    let engine = PlatzhalterEngine::neu("127.0.0.1", basis_port, max_kanaele);

    let mut konfig = LinkKonfiguration::neu(stand.adresse.to_string(), instanz);
    konfig.wiederverbindung = Duration::from_millis(50);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let link = WorkerLink::neu(konfig, Arc::new(engine.clone()));
    tokio::spawn(link.starten(shutdown_rx));

    (engine, shutdown_tx)
}

async fn warte_bis(beschreibung: &str, bedingung: impl Fn() -> bool) {
    for _ in 0..200 {
        if bedingung() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("Nicht rechtzeitig eingetreten: {beschreibung}");
}

async fn kanal_oeffnen_und_warten(
    tabelle: &KanalTabelle,
) -> (KanalProxy, mpsc::Receiver<WorkerNachricht>) {
    let (sink, sink_rx) = mpsc::channel(16);
    let (kanal, quittung) = tabelle
        .kanal_oeffnen(KanalOeffnenOptionen::default(), sink)
        .await
        .expect("Oeffnen gelingt");
    quittung.warten().await.expect("Bestaetigung kommt");
    (kanal, sink_rx)
}

#[tokio::test]
async fn worker_meldet_sich_ueber_tcp_an() {
    let stand = proxy_hochfahren().await;
    let (_engine, _w) = worker_hochfahren(&stand, "alpha", 43000, 8);

    let r = stand.registry.clone();
    warte_bis("Worker angemeldet", move || r.anzahl() == 1).await;

    let worker = stand.registry.worker("alpha").expect("alpha ist da");
    assert_eq!(worker.kapazitaet().available, 8);
    assert_eq!(worker.kapazitaet().current, 0);
}

#[tokio::test]
async fn kanal_lebenslauf_ueber_echtes_tcp() {
    let stand = proxy_hochfahren().await;
    let (engine, _w) = worker_hochfahren(&stand, "alpha", 43100, 8);
    let r = stand.registry.clone();
    warte_bis("Worker angemeldet", move || r.anzahl() == 1).await;

    let (kanal, mut sink_rx) = kanal_oeffnen_und_warten(&stand.tabelle).await;
    assert!(kanal.uuid().is_some());
    assert_eq!(
        kanal.lokale_adresse().map(|a| a.address),
        Some("127.0.0.1".into())
    );
    assert_eq!(kanal.worker_instanz().as_deref(), Some("alpha"));

    // Operationen laufen bis zur Engine durch
    kanal.dtmf("123#").await.unwrap();
    kanal.echo().await.unwrap();
    kanal
        .abspielen(serde_json::json!({ "file": "ansage.wav" }))
        .await
        .unwrap();
    let e = engine.clone();
    warte_bis("Engine hat alles gesehen", move || {
        let stand = e.zaehler();
        stand.dtmf == 1 && stand.echo == 1 && stand.abspielen == 1
    })
    .await;

    // Schliessen traegt den Kanal sofort aus; das close geht zum Worker
    kanal.schliessen().await.unwrap();
    assert_eq!(stand.tabelle.kanal_anzahl(), 0);
    let ergebnis = kanal.dtmf("4").await;
    assert!(matches!(
        ergebnis,
        Err(TonmeisterFehler::UnbekannterKanal(_))
    ));

    let e = engine.clone();
    warte_bis("Engine hat das close gesehen", move || {
        e.zaehler().schliessen == 1
    })
    .await;

    // Die Kapazitaet ist ueber den Huckepack-Status zurueckgelaufen
    let r = stand.registry.clone();
    warte_bis("Kapazitaet wieder frei", move || {
        r.worker("alpha").map(|w| w.kapazitaet().current) == Some(0)
    })
    .await;

    // Das close-Ereignis des Workers trifft keinen Eintrag mehr
    assert!(sink_rx.try_recv().is_err());
}

#[tokio::test]
async fn vermittlung_bevorzugt_den_freieren_worker() {
    let stand = proxy_hochfahren().await;
    let (_klein, _w1) = worker_hochfahren(&stand, "klein", 43200, 2);
    let (_gross, _w2) = worker_hochfahren(&stand, "gross", 43300, 8);
    let r = stand.registry.clone();
    warte_bis("Beide Worker angemeldet", move || r.anzahl() == 2).await;

    // Drei Kanaele ohne Affinitaet: alle landen beim groesseren Spielraum
    for _ in 0..3 {
        let (kanal, _sink_rx) = kanal_oeffnen_und_warten(&stand.tabelle).await;
        assert_eq!(kanal.worker_instanz().as_deref(), Some("gross"));
    }
}

#[tokio::test]
async fn fehlgeschlagenes_oeffnen_weist_die_quittung_ab() {
    let stand = proxy_hochfahren().await;
    let (engine, _w) = worker_hochfahren(&stand, "alpha", 43400, 8);
    let r = stand.registry.clone();
    warte_bis("Worker angemeldet", move || r.anzahl() == 1).await;

    engine.oeffnen_fehlschlagen_lassen(true);

    let (sink, mut sink_rx) = mpsc::channel(16);
    let (_kanal, quittung) = stand
        .tabelle
        .kanal_oeffnen(KanalOeffnenOptionen::default(), sink)
        .await
        .unwrap();

    let ergebnis = quittung.warten().await;
    assert!(matches!(
        ergebnis,
        Err(TonmeisterFehler::VorOeffnungGeschlossen)
    ));

    // Der Grund der Ablehnung steht im close-Ereignis
    let abgelehnt = sink_rx.recv().await.expect("close-Ereignis kommt");
    assert_eq!(abgelehnt.aktion(), Some("close"));
    assert!(abgelehnt.rest["reason"]
        .as_str()
        .unwrap()
        .contains("verweigert"));
    assert_eq!(stand.tabelle.kanal_anzahl(), 0);
}

#[tokio::test]
async fn bruecke_ueber_zwei_knoten() {
    let stand = proxy_hochfahren().await;
    let (engine_1, _w1) = worker_hochfahren(&stand, "knoten-a", 43500, 8);
    let (engine_2, _w2) = worker_hochfahren(&stand, "knoten-b", 43600, 8);
    let r = stand.registry.clone();
    warte_bis("Beide Worker angemeldet", move || r.anzahl() == 2).await;

    // Der Huckepack-Status des ersten Kanals lenkt den zweiten auf den
    // anderen Worker
    let (a, mut sink_a) = kanal_oeffnen_und_warten(&stand.tabelle).await;
    let r = stand.registry.clone();
    let belegt = a.worker_instanz().unwrap();
    warte_bis("Belegung ist verbucht", move || {
        r.worker(&belegt).map(|w| w.kapazitaet().current) == Some(1)
    })
    .await;
    let (b, mut sink_b) = kanal_oeffnen_und_warten(&stand.tabelle).await;
    assert_ne!(a.worker_instanz(), b.worker_instanz());

    // Aufbau: je ein Hilfskanal, eine Gegenstelle und eine Mischung pro Seite
    a.mischen(&b).await.expect("Bruecke entsteht");
    assert_eq!(stand.tabelle.bruecken_anzahl(), 1);
    assert_eq!(stand.tabelle.kanal_anzahl(), 4);

    let (e1, e2) = (engine_1.clone(), engine_2.clone());
    warte_bis("Beide Engines haben Bruecken-Arbeit gesehen", move || {
        let (s1, s2) = (e1.zaehler(), e2.zaehler());
        s1.oeffnen == 2
            && s2.oeffnen == 2
            && s1.gegenstelle == 1
            && s2.gegenstelle == 1
            && s1.mischen == 1
            && s2.mischen == 1
    })
    .await;

    // Abbau ueber unmix: jedes Bein wird entmischt, die Hilfskanaele
    // werden geschlossen, die Originale bleiben
    a.mix_loesen().await.expect("Aufloesen gelingt");
    let (e1, e2) = (engine_1.clone(), engine_2.clone());
    warte_bis("Abbau ist durchgelaufen", move || {
        let (s1, s2) = (e1.zaehler(), e2.zaehler());
        s1.mix_loesen == 2 && s2.mix_loesen == 2 && s1.schliessen == 1 && s2.schliessen == 1
    })
    .await;
    let t = stand.tabelle.clone();
    warte_bis("Hilfskanaele sind ausgetragen", move || {
        t.kanal_anzahl() == 2
    })
    .await;
    assert_eq!(stand.tabelle.bruecken_anzahl(), 0);

    // Die Originale ueberleben den Abbau; schliessen traegt sie sofort aus
    a.schliessen().await.unwrap();
    b.schliessen().await.unwrap();
    assert_eq!(stand.tabelle.kanal_anzahl(), 0);
    let (e1, e2) = (engine_1.clone(), engine_2.clone());
    warte_bis("Beide Engines haben das close gesehen", move || {
        e1.zaehler().schliessen == 2 && e2.zaehler().schliessen == 2
    })
    .await;

    // Keine close-Ereignisse mehr: die Eintraege waren schon ausgetragen
    assert!(sink_a.try_recv().is_err());
    assert!(sink_b.try_recv().is_err());
}

#[tokio::test]
async fn worker_verlust_beendet_kanaele_und_bruecken() {
    let stand = proxy_hochfahren().await;
    let (_engine_1, _w1) = worker_hochfahren(&stand, "bleibt", 43700, 8);
    let (_engine_2, w2_stopp) = worker_hochfahren(&stand, "stirbt", 43800, 8);
    let r = stand.registry.clone();
    warte_bis("Beide Worker angemeldet", move || r.anzahl() == 2).await;

    let (a, sink_a) = kanal_oeffnen_und_warten(&stand.tabelle).await;
    let r = stand.registry.clone();
    let belegt = a.worker_instanz().unwrap();
    warte_bis("Belegung ist verbucht", move || {
        r.worker(&belegt).map(|w| w.kapazitaet().current) == Some(1)
    })
    .await;
    let (b, sink_b) = kanal_oeffnen_und_warten(&stand.tabelle).await;
    a.mischen(&b).await.expect("Bruecke entsteht");
    assert_eq!(stand.tabelle.kanal_anzahl(), 4);

    // Festhalten, welches Original auf dem Opfer liegt, dann hart beenden
    let a_auf_opfer = a.worker_instanz().as_deref() == Some("stirbt");
    let (mut toter_sink, ueberlebender) = if a_auf_opfer {
        (sink_a, &b)
    } else {
        (sink_b, &a)
    };
    w2_stopp.send(true).unwrap();

    let r = stand.registry.clone();
    warte_bis("Worker ist abgemeldet", move || r.anzahl() == 1).await;
    let t = stand.tabelle.clone();
    warte_bis("Kanaele des Workers sind weg", move || t.kanal_anzahl() <= 2).await;
    assert_eq!(stand.tabelle.bruecken_anzahl(), 0);

    // Der Sink des toten Beins bekommt das synthetische Ereignis
    let nachricht = tokio::time::timeout(Duration::from_secs(2), toter_sink.recv())
        .await
        .expect("Ereignis kommt rechtzeitig")
        .expect("Sink lebt noch");
    assert_eq!(nachricht.aktion(), Some("worker-lost"));
    assert_eq!(nachricht.rest["instance"], "stirbt");

    // Das ueberlebende Bein laesst sich weiter bedienen und schliessen
    ueberlebender.dtmf("1").await.expect("Kanal lebt noch");
    ueberlebender.schliessen().await.expect("close geht raus");
    let t = stand.tabelle.clone();
    warte_bis("Tabelle ist leer", move || t.kanal_anzahl() == 0).await;
}

#[tokio::test]
async fn affinitaet_haelt_nachbarn_zusammen() {
    let stand = proxy_hochfahren().await;
    let (_e1, _w1) = worker_hochfahren(&stand, "links", 43900, 8);
    let (_e2, _w2) = worker_hochfahren(&stand, "rechts", 44000, 8);
    let r = stand.registry.clone();
    warte_bis("Beide Worker angemeldet", move || r.anzahl() == 2).await;

    let (erster, _sink) = kanal_oeffnen_und_warten(&stand.tabelle).await;
    let uuid = erster.uuid().expect("bestaetigt");

    // Nachbarn mit Affinitaet landen alle auf demselben Worker, auch wenn
    // der andere mehr Spielraum hat
    for _ in 0..4 {
        let (sink, _sink_rx) = mpsc::channel(16);
        let optionen = KanalOeffnenOptionen {
            related: vec![uuid],
            ..Default::default()
        };
        let (nachbar, quittung) = stand.tabelle.kanal_oeffnen(optionen, sink).await.unwrap();
        quittung.warten().await.unwrap();
        assert_eq!(nachbar.worker_instanz(), erster.worker_instanz());
    }
}
