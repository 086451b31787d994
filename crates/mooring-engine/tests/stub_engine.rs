use std::sync::Arc;
use std::time::Duration;

use mooring_core::{AddRequest, EngineSession, SessionSettings};
use mooring_engine::{EngineFacade, FacadeOptions, MagnetLink, StubCall, StubSession};

fn torrent_document() -> Vec<u8> {
    let mut doc = Vec::new();
    doc.extend_from_slice(b"d4:infod5:filesld6:lengthi64e4:pathl5:a.mkveed6:lengthi8e4:pathl5:b.nfoeee");
    doc.extend_from_slice(b"4:name4:pack12:piece lengthi16384e6:pieces20:");
    doc.extend_from_slice(&[3_u8; 20]);
    doc.extend_from_slice(b"ee");
    doc
}

async fn wait_until(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

#[tokio::test]
async fn metainfo_file_round_trip_through_facade() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("pack.torrent");
    tokio::fs::write(&path, torrent_document()).await?;

    let session = Arc::new(StubSession::default());
    let facade = EngineFacade::with_options(
        session.clone(),
        FacadeOptions {
            poll_interval: Duration::from_millis(5),
            event_queue_capacity: 8,
        },
    );
    facade.start(&SessionSettings::default()).await?;

    let metainfo = facade.load_metainfo(&path).await?;
    assert_eq!(metainfo.name, "pack");
    assert_eq!(metainfo.files.len(), 2);
    assert_eq!(metainfo.total_size(), 72);

    let info_hash = metainfo.info_hash.clone();
    let handle = facade
        .add(AddRequest {
            metainfo,
            save_path: dir.path().to_path_buf(),
        })
        .await?;
    assert!(wait_until(|| facade.is_live(&info_hash)).await);

    let files = facade.files(&handle).await?;
    assert_eq!(files.len(), 2);
    assert!(files.iter().any(|file| file.path.ends_with("a.mkv")));

    facade.remove(&handle, true).await?;
    assert!(wait_until(|| !facade.is_live(&info_hash)).await);
    assert!(facade.find_handle(&info_hash).await.is_none());
    assert!(session.calls().contains(&StubCall::Remove {
        info_hash,
        delete_files: true,
    }));

    facade.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn registered_magnet_metadata_resolves() -> anyhow::Result<()> {
    let session = Arc::new(StubSession::default());
    session.start(&SessionSettings::default()).await?;
    let bytes = torrent_document();
    let metainfo = mooring_engine::metainfo::parse_bytes(&bytes)?;
    session.register_metadata(metainfo.clone());

    let facade = EngineFacade::new(session);
    let uri = format!("magnet:?xt=urn:btih:{}&dn=pack", metainfo.info_hash);
    let link = MagnetLink::parse(&uri)?;
    assert_eq!(link.info_hash, metainfo.info_hash);

    let fetched = facade.fetch_metadata(&uri, Duration::from_secs(1)).await?;
    assert_eq!(fetched, metainfo);
    Ok(())
}
