//! Per-region data release dates scraped from the downloads page.
//!
//! Each region is rendered as a `div.listagem-estados` block holding a
//! download button tagged with `data-estado` and a
//! `div.data-disponibilizacao` with the publication date. Blocks with an
//! unknown region code or no date are skipped; the page may carry extra or
//! future markup.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::model::Region;

/// Release date text (`DD/MM/YYYY`, kept verbatim) per region.
pub type ReleaseDates = BTreeMap<Region, String>;

#[allow(clippy::expect_used)]
static STATE_BLOCK: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("div.listagem-estados").expect("state block selector is valid")
});

#[allow(clippy::expect_used)]
static STATE_BUTTON: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("button.btn-abrir-modal-download-base-poligono[data-estado]")
        .expect("state button selector is valid")
});

#[allow(clippy::expect_used)]
static RELEASE_DATE: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("div.data-disponibilizacao").expect("release date selector is valid")
});

/// Extracts the region → date mapping from the downloads page.
///
/// Invalid UTF-8 is replaced rather than rejected. Returns an empty map for
/// a page without recognisable blocks.
#[must_use]
pub fn parse_release_dates(html: &[u8]) -> ReleaseDates {
    let text = String::from_utf8_lossy(html);
    let document = Html::parse_document(&text);

    let mut dates = ReleaseDates::new();
    for block in document.select(&STATE_BLOCK) {
        match parse_block(block) {
            Some((region, date)) => {
                dates.insert(region, date);
            }
            None => debug!("skipping unrecognised release block"),
        }
    }
    dates
}

fn parse_block(block: ElementRef<'_>) -> Option<(Region, String)> {
    let code = block
        .select(&STATE_BUTTON)
        .next()?
        .value()
        .attr("data-estado")?;
    let region = Region::from_code(code.trim())?;

    let date: String = block
        .select(&RELEASE_DATE)
        .next()?
        .text()
        .collect::<String>()
        .trim()
        .to_string();
    if date.is_empty() {
        return None;
    }
    Some((region, date))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn block(code: &str, date: &str) -> String {
        format!(
            r#"<div class="listagem-estados">
                 <span class="nome-estado">Estado</span>
                 <button class="btn btn-abrir-modal-download-base-poligono" data-estado="{code}">Baixar</button>
                 <div class="data-disponibilizacao">
                   {date}
                 </div>
               </div>"#
        )
    }

    fn page(blocks: &[String]) -> Vec<u8> {
        format!("<html><body><section>{}</section></body></html>", blocks.concat()).into_bytes()
    }

    #[test]
    fn test_parses_every_recognised_block() {
        let html = page(&[block("SP", "05/03/2024"), block("MG", "12/02/2024")]);
        let dates = parse_release_dates(&html);
        assert_eq!(dates.len(), 2);
        assert_eq!(dates[&Region::SP], "05/03/2024");
        assert_eq!(dates[&Region::MG], "12/02/2024");
    }

    #[test]
    fn test_skips_unknown_region_codes() {
        let html = page(&[block("SP", "05/03/2024"), block("X#", "01/01/2024")]);
        let dates = parse_release_dates(&html);
        assert_eq!(dates.len(), 1);
        assert_eq!(dates.get(&Region::SP).map(String::as_str), Some("05/03/2024"));
    }

    #[test]
    fn test_skips_blocks_without_date_or_button() {
        let no_date = r#"<div class="listagem-estados">
            <button class="btn-abrir-modal-download-base-poligono" data-estado="RJ"></button>
            <div class="data-disponibilizacao">   </div></div>"#
            .to_string();
        let no_button = r#"<div class="listagem-estados">
            <div class="data-disponibilizacao">01/02/2024</div></div>"#
            .to_string();
        let html = page(&[no_date, no_button, block("BA", "20/01/2024")]);

        let dates = parse_release_dates(&html);

        assert_eq!(dates.keys().copied().collect::<Vec<_>>(), vec![Region::BA]);
    }

    #[test]
    fn test_region_code_is_exact_match() {
        let html = page(&[block("sp", "05/03/2024")]);
        assert!(parse_release_dates(&html).is_empty());
    }

    #[test]
    fn test_tolerates_invalid_utf8() {
        let mut html = page(&[block("PR", "07/03/2024")]);
        html.extend_from_slice(&[0xff, 0xfe]);
        assert_eq!(parse_release_dates(&html)[&Region::PR], "07/03/2024");
    }

    #[test]
    fn test_empty_page() {
        assert!(parse_release_dates(b"").is_empty());
    }
}
