use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::warn;

use crate::domain::{Country, ResultRow, UtteranceId};

/// Title of the per-row "expand context" anchor whose text is the utterance id.
const CONTEXT_ANCHOR_TITLE: &str = "Ampliar contexto";
const NEXT_PAGE_STYLE: &str = "text-decoration:none;";
const NEXT_PAGE_LABEL: &str = "Siguientes";

static ROW_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
static CELL_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").unwrap());
static ANCHOR_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").unwrap());
static NEXT_PAGE_HREF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"javascript:buscando\(\d+\)").unwrap());

/// Everything the crawler needs from one results page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageScan {
    pub rows: Vec<ResultRow>,
    pub skipped: usize,
    pub has_next: bool,
}

pub fn scan_page(html: &str) -> PageScan {
    let document = Html::parse_document(html);
    let mut rows = Vec::new();
    let mut skipped = 0;
    for row in document.select(&ROW_SELECTOR) {
        match parse_row(row) {
            RowOutcome::Parsed(parsed) => rows.push(parsed),
            RowOutcome::Invalid => skipped += 1,
            RowOutcome::NotResult => {}
        }
    }
    PageScan {
        rows,
        skipped,
        has_next: has_next_page(&document),
    }
}

enum RowOutcome {
    Parsed(ResultRow),
    Invalid,
    NotResult,
}

fn parse_row(row: ElementRef<'_>) -> RowOutcome {
    let Some(anchor) = row
        .select(&ANCHOR_SELECTOR)
        .find(|a| a.value().attr("title") == Some(CONTEXT_ANCHOR_TITLE))
    else {
        return RowOutcome::NotResult;
    };
    let cells: Vec<ElementRef<'_>> = row.select(&CELL_SELECTOR).collect();
    if cells.len() < 2 {
        return RowOutcome::NotResult;
    }

    let raw_id = stripped_text(anchor);
    let raw_country = stripped_text(cells[cells.len() - 2]);
    match (raw_id.parse::<UtteranceId>(), raw_country.parse::<Country>()) {
        (Ok(utterance), Ok(country)) => RowOutcome::Parsed(ResultRow { utterance, country }),
        (Err(err), _) | (_, Err(err)) => {
            warn!(%err, "skipping result row");
            RowOutcome::Invalid
        }
    }
}

fn has_next_page(document: &Html) -> bool {
    document.select(&ANCHOR_SELECTOR).any(|a| {
        let element = a.value();
        element
            .attr("href")
            .is_some_and(|href| NEXT_PAGE_HREF.is_match(href))
            && element.attr("style") == Some(NEXT_PAGE_STYLE)
            && a.text().collect::<String>().contains(NEXT_PAGE_LABEL)
    })
}

/// Concatenation of every text node with surrounding whitespace removed.
fn stripped_text(element: ElementRef<'_>) -> String {
    element.text().map(str::trim).collect()
}
