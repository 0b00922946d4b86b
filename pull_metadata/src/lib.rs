use connect_sync::tables::METADATA_TABLE;
use connect_sync::{
    ConnectMetadata, FieldMapper, Fetcher, PageSource, Row, Store, SyncError, SyncPipeline, SyncReport, TableSpec,
    WriteMode,
};
use tracing::info;

pub const METADATA: TableSpec = TableSpec {
    table: METADATA_TABLE,
    columns: &["arn", "name", "arn_type"],
    mode: WriteMode::Upsert,
};

pub fn metadata_row(m: &ConnectMetadata) -> Row {
    vec![m.arn.as_str().into(), m.name.as_str().into(), m.arn_type.into()]
}

/// Sync each listing into `connect_metadata`, one after the other. Every
/// listing reads the table's keys again, so later listings see the rows the
/// earlier ones inserted.
pub async fn pull_metadata<P, S>(fetcher: &Fetcher, sources: &[P], store: &S) -> Result<Vec<SyncReport>, SyncError>
where
    P: PageSource<Item = ConnectMetadata>,
    S: Store + ?Sized,
{
    let pipeline = SyncPipeline::new(store, METADATA, FieldMapper(metadata_row));
    let mut reports = Vec::with_capacity(sources.len());
    for source in sources {
        let entries = fetcher.fetch_all(source, &[]).await?;
        info!("{} returned {} entries", source.operation(), entries.len());
        reports.push(pipeline.run(entries).await?);
    }
    Ok(reports)
}
