//! A searchable catalog of IANA time zones with facet counts over offset
//! and daylight saving time.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::{OffsetComponents, TZ_VARIANTS, Tz};
use serde::{Deserialize, Serialize};
use tantivy::{
    IndexWriter,
    TantivyDocument,
    Term,
    collector::{Count, FacetCollector, TopDocs},
    doc,
    query::{BooleanQuery, Occur, Query, TermQuery},
    schema::*,
};
use tracing::{debug, info};

use crate::{
    error::{Error, Result},
    query::KeywordParser,
    tantivy_index::{
        SearchIndex,
        WRITER_MEMORY_BUDGET,
        analyzed_text,
        extract_text,
    },
};

pub mod fields {
    pub const ID: &str = "id";
    pub const DISPLAY_NAME: &str = "time_zone_display_name";
    pub const OFFSET: &str = "offset";
    pub const OBSERVES_DST: &str = "observes_daylight_savings_time";
    pub const FACETS: &str = "facets";
}

/// Ids that name an offset rather than a place.
const OFFSET_ALIASES: &[&str] = &[
    "GMT",
    "GMT0",
    "GMT+0",
    "GMT-0",
    "UTC",
    "UCT",
    "Universal",
    "Zulu",
    "Greenwich",
    "Factory",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeZoneInfo {
    pub id: String,
    pub display_name: String,
    pub abbreviation: String,
    /// Base (standard time) offset from UTC.
    pub offset_seconds: i64,
    pub observes_dst: bool,
}

impl TimeZoneInfo {
    pub fn offset_description(&self) -> String {
        offset_description(self.offset_seconds)
    }
}

/// Format an offset the way ISO-8601 durations are usually printed:
/// `PT0S`, `PT-6H`, `PT5H45M`, `PT-3H-30M`.
pub fn offset_description(seconds: i64) -> String {
    if seconds == 0 {
        return "PT0S".to_string();
    }

    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    let mut out = String::from("PT");
    if hours != 0 {
        out.push_str(&format!("{hours}H"));
    }
    if minutes != 0 {
        out.push_str(&format!("{minutes}M"));
    }
    if secs != 0 {
        out.push_str(&format!("{secs}S"));
    }
    out
}

fn is_offset_alias(id: &str) -> bool {
    id.starts_with("Etc/") || OFFSET_ALIASES.contains(&id)
}

/// `America/Argentina/Buenos_Aires` becomes
/// `Buenos Aires, America/Argentina (-03)`.
fn display_name(id: &str, abbreviation: &str) -> String {
    let place = match id.rsplit_once('/') {
        Some((region, city)) => format!("{}, {region}", city.replace('_', " ")),
        None => id.replace('_', " "),
    };
    format!("{place} ({abbreviation})")
}

fn utc_instant(year: i32, month: u32) -> Result<NaiveDateTime> {
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| Error::Config(format!("invalid reference year {year}")))
}

fn describe(tz: Tz, january: &NaiveDateTime, july: &NaiveDateTime) -> TimeZoneInfo {
    let winter = tz.offset_from_utc_datetime(january);
    let summer = tz.offset_from_utc_datetime(july);
    let abbreviation = winter.to_string();
    let observes_dst = winter.dst_offset().num_seconds() != 0
        || summer.dst_offset().num_seconds() != 0;

    TimeZoneInfo {
        id: tz.name().to_string(),
        display_name: display_name(tz.name(), &abbreviation),
        abbreviation,
        offset_seconds: winter.base_utc_offset().num_seconds(),
        observes_dst,
    }
}

/// Every place-named zone, described as of `year`, sorted by base offset
/// then id.
pub fn catalog_at(year: i32) -> Result<Vec<TimeZoneInfo>> {
    let january = utc_instant(year, 1)?;
    let july = utc_instant(year, 7)?;

    let mut zones: Vec<TimeZoneInfo> = TZ_VARIANTS
        .iter()
        .filter(|tz| !is_offset_alias(tz.name()))
        .map(|tz| describe(*tz, &january, &july))
        .collect();
    zones.sort_by(|a, b| {
        a.offset_seconds
            .cmp(&b.offset_seconds)
            .then_with(|| a.id.cmp(&b.id))
    });
    Ok(zones)
}

/// The catalog as of the current year.
pub fn catalog() -> Result<Vec<TimeZoneInfo>> {
    catalog_at(Utc::now().year())
}

// -- Search --

#[derive(Clone, Copy)]
struct TimeZoneFields {
    id: Field,
    display_name: Field,
    offset: Field,
    observes_dst: Field,
    facets: Field,
}

pub fn schema() -> Schema {
    let mut builder = Schema::builder();
    builder.add_text_field(fields::ID, analyzed_text(true));
    builder.add_text_field(fields::DISPLAY_NAME, analyzed_text(true));
    builder.add_text_field(fields::OFFSET, STRING | STORED);
    builder.add_text_field(fields::OBSERVES_DST, STRING | STORED);
    builder.add_facet_field(fields::FACETS, FacetOptions::default());
    builder.build()
}

fn offset_facet(description: &str) -> Facet {
    Facet::from_path([fields::OFFSET, description])
}

fn dst_facet(observes: bool) -> Facet {
    Facet::from_path([fields::OBSERVES_DST, if observes { "true" } else { "false" }])
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    /// Maximum number of hits returned. `None` returns every hit.
    pub limit: Option<usize>,
    /// Drill down to zones that do (or do not) observe DST.
    pub dst: Option<bool>,
    /// Drill down to one offset description such as `PT-6H`.
    pub offset: Option<String>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeZoneHit {
    pub id: String,
    pub display_name: String,
    pub offset: String,
    pub observes_daylight_savings_time: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FacetValue {
    pub value: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResults {
    pub query: String,
    /// Number of matching zones, which may exceed `hits.len()`.
    pub hit_count: usize,
    pub hits: Vec<TimeZoneHit>,
    /// Value counts per dimension over every matching zone.
    pub facets: BTreeMap<String, Vec<FacetValue>>,
}

/// The time zone catalog held in an in-memory index.
pub struct TimeZoneSearchSystem {
    index: SearchIndex,
    fields: TimeZoneFields,
}

impl TimeZoneSearchSystem {
    /// Build the index from the current catalog. Returns once indexing is
    /// complete.
    pub fn init() -> Result<Self> {
        Self::from_catalog(&catalog()?)
    }

    pub fn from_catalog(zones: &[TimeZoneInfo]) -> Result<Self> {
        let index = SearchIndex::open_in_ram(schema())?;
        let fields = TimeZoneFields {
            id: index.field(fields::ID)?,
            display_name: index.field(fields::DISPLAY_NAME)?,
            offset: index.field(fields::OFFSET)?,
            observes_dst: index.field(fields::OBSERVES_DST)?,
            facets: index.field(fields::FACETS)?,
        };

        info!(zones = zones.len(), "indexing time zones");
        let mut writer: IndexWriter = index.writer(WRITER_MEMORY_BUDGET)?;
        for zone in zones {
            let offset = zone.offset_description();
            writer.add_document(doc!(
                fields.id => zone.id.as_str(),
                fields.display_name => zone.display_name.as_str(),
                fields.offset => offset.as_str(),
                fields.observes_dst => zone.observes_dst.to_string(),
                fields.facets => offset_facet(&offset),
                fields.facets => dst_facet(zone.observes_dst),
            ))?;
        }
        writer.commit()?;
        info!("indexing done");

        Ok(Self { index, fields })
    }

    pub fn len(&self) -> Result<u64> {
        self.index.num_docs()
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn search(&self, request: &SearchRequest) -> Result<SearchResults> {
        let f = self.fields;
        info!(query = %request.query, "searching time zones");

        let user_query = KeywordParser::new(&self.index, vec![f.id, f.display_name])
            .parse(&request.query)?;

        let mut clauses: Vec<(Occur, Box<dyn Query>)> = vec![(Occur::Must, user_query)];
        if let Some(observes) = request.dst {
            clauses.push((Occur::Must, self.facet_query(&dst_facet(observes))));
        }
        if let Some(offset) = &request.offset {
            clauses.push((Occur::Must, self.facet_query(&offset_facet(offset))));
        }
        let query = BooleanQuery::new(clauses);

        let searcher = self.index.searcher()?;
        // The collector allocates up front, so never ask for more hits
        // than there are documents.
        let num_docs = searcher.num_docs() as usize;
        let limit = request.limit.map_or(num_docs, |l| l.min(num_docs));

        let mut facet_collector = FacetCollector::for_field(fields::FACETS);
        facet_collector.add_facet(format!("/{}", fields::OFFSET).as_str());
        facet_collector.add_facet(format!("/{}", fields::OBSERVES_DST).as_str());

        let (hit_count, top_docs, facet_counts) = searcher.search(
            &query,
            &(Count, TopDocs::with_limit(limit.max(1)), facet_collector),
        )?;

        let mut hits = Vec::with_capacity(limit.min(top_docs.len()));
        for (_score, doc_address) in top_docs.into_iter().take(limit) {
            let doc: TantivyDocument = searcher.doc(doc_address)?;
            hits.push(TimeZoneHit {
                id: extract_text(&doc, f.id),
                display_name: extract_text(&doc, f.display_name),
                offset: extract_text(&doc, f.offset),
                observes_daylight_savings_time: extract_text(&doc, f.observes_dst)
                    == "true",
            });
        }

        let mut facets = BTreeMap::new();
        for dim in [fields::OFFSET, fields::OBSERVES_DST] {
            let mut values: Vec<FacetValue> = facet_counts
                .get(format!("/{dim}").as_str())
                .filter_map(|(facet, count)| {
                    facet.to_path().last().map(|value| FacetValue {
                        value: value.to_string(),
                        count,
                    })
                })
                .collect();
            values.sort_by(|a, b| {
                b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value))
            });
            facets.insert(dim.to_string(), values);
        }

        debug!(hit_count, returned = hits.len(), "search done");
        Ok(SearchResults {
            query: request.query.clone(),
            hit_count,
            hits,
            facets,
        })
    }

    fn facet_query(&self, facet: &Facet) -> Box<dyn Query> {
        let term = Term::from_facet(self.fields.facets, facet);
        Box::new(TermQuery::new(term, IndexRecordOption::Basic))
    }
}
