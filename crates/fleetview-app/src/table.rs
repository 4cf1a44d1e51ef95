// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Paged, filterable view state over an in-memory collection.
//!
//! A [`TableView`] owns the records backing one dashboard table and exposes a
//! single page of the filtered collection at a time. Selections for the
//! detail and action overlays index into the filtered collection and are
//! cleared whenever the visible set can shift, so an overlay never shows a
//! different record than the one the user picked.

use std::fmt;
use std::ops::Range;

/// Accessor for one string field that participates in filtering.
pub type SearchField<R> = fn(&R) -> &str;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewError {
    InvalidConfiguration { page_size: usize },
    IndexOutOfRange { index: usize, len: usize },
}

impl fmt::Display for ViewError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfiguration { page_size } => {
                write!(f, "page size must be at least 1, got {page_size}")
            }
            Self::IndexOutOfRange { index, len } => write!(
                f,
                "row {index} is out of range for {len} rows -- clear the selection and retry"
            ),
        }
    }
}

impl std::error::Error for ViewError {}

#[derive(Clone)]
pub struct TableView<R> {
    records: Vec<R>,
    search_fields: Vec<SearchField<R>>,
    page_size: usize,
    offset: usize,
    filter_query: String,
    filtered: Vec<usize>,
    selected_detail: Option<usize>,
    selected_action: Option<usize>,
}

impl<R: fmt::Debug> fmt::Debug for TableView<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableView")
            .field("records", &self.records)
            .field("search_fields", &self.search_fields.len())
            .field("page_size", &self.page_size)
            .field("offset", &self.offset)
            .field("filter_query", &self.filter_query)
            .field("filtered", &self.filtered)
            .field("selected_detail", &self.selected_detail)
            .field("selected_action", &self.selected_action)
            .finish()
    }
}

impl<R> TableView<R> {
    pub fn new(
        records: Vec<R>,
        page_size: usize,
        search_fields: Vec<SearchField<R>>,
    ) -> Result<Self, ViewError> {
        if page_size == 0 {
            return Err(ViewError::InvalidConfiguration { page_size });
        }

        let filtered = (0..records.len()).collect();
        Ok(Self {
            records,
            search_fields,
            page_size,
            offset: 0,
            filter_query: String::new(),
            filtered,
            selected_detail: None,
            selected_action: None,
        })
    }

    /// Replaces the filter query and rebuilds the filtered collection.
    ///
    /// A blank query shows every record in collection order. Otherwise a
    /// record is kept when any searchable field contains the query,
    /// ignoring case. The view always returns to the first page with no
    /// selections.
    pub fn set_filter_query(&mut self, query: &str) {
        query.clone_into(&mut self.filter_query);
        self.refilter();
        self.offset = 0;
        self.clear_selections();
    }

    pub fn current_page(&self) -> Vec<&R> {
        self.filtered[self.page_range()]
            .iter()
            .map(|&source| &self.records[source])
            .collect()
    }

    /// Filtered indices covered by the current page.
    pub fn page_range(&self) -> Range<usize> {
        let len = self.filtered.len();
        if self.offset >= len {
            return len..len;
        }
        self.offset..self.offset.saturating_add(self.page_size).min(len)
    }

    pub fn advance(&mut self) -> bool {
        if self.has_next_page() {
            self.offset += self.page_size;
            true
        } else {
            false
        }
    }

    pub fn retreat(&mut self) -> bool {
        if self.has_prev_page() {
            self.offset = self.offset.saturating_sub(self.page_size);
            true
        } else {
            false
        }
    }

    pub fn select_detail(&mut self, index: Option<usize>) -> Result<(), ViewError> {
        self.selected_detail = self.check_selection(index)?;
        Ok(())
    }

    pub fn select_action(&mut self, index: Option<usize>) -> Result<(), ViewError> {
        self.selected_action = self.check_selection(index)?;
        Ok(())
    }

    pub fn replace_collection(&mut self, records: Vec<R>) {
        self.records = records;
        self.after_mutation();
    }

    pub fn append(&mut self, record: R) {
        self.records.push(record);
        self.after_mutation();
    }

    /// Removes the record at `index` in the full collection.
    pub fn remove_at(&mut self, index: usize) -> Result<R, ViewError> {
        if index >= self.records.len() {
            return Err(ViewError::IndexOutOfRange {
                index,
                len: self.records.len(),
            });
        }
        let removed = self.records.remove(index);
        self.after_mutation();
        Ok(removed)
    }

    pub fn remove_where<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(&R) -> bool,
    {
        let before = self.records.len();
        self.records.retain(|record| !predicate(record));
        let removed = before - self.records.len();
        self.after_mutation();
        removed
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn filtered_len(&self) -> usize {
        self.filtered.len()
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn page_count(&self) -> usize {
        self.filtered.len().div_ceil(self.page_size)
    }

    /// One-based page number, or 0 when nothing is visible.
    pub fn page_number(&self) -> usize {
        if self.filtered.is_empty() {
            return 0;
        }
        (self.offset / self.page_size + 1).min(self.page_count())
    }

    pub fn has_next_page(&self) -> bool {
        self.offset.saturating_add(self.page_size) < self.filtered.len()
    }

    pub fn has_prev_page(&self) -> bool {
        self.offset > 0
    }

    pub fn filter_query(&self) -> &str {
        &self.filter_query
    }

    pub fn is_filtered(&self) -> bool {
        !self.filter_query.trim().is_empty()
    }

    pub fn records(&self) -> &[R] {
        &self.records
    }

    pub fn filtered(&self) -> impl Iterator<Item = &R> + '_ {
        self.filtered.iter().map(|&source| &self.records[source])
    }

    pub fn get(&self, filtered_index: usize) -> Option<&R> {
        self.source_index(filtered_index)
            .and_then(|source| self.records.get(source))
    }

    /// Maps a filtered index back to its position in the full collection.
    pub fn source_index(&self, filtered_index: usize) -> Option<usize> {
        self.filtered.get(filtered_index).copied()
    }

    pub fn selected_detail(&self) -> Option<usize> {
        self.selected_detail
    }

    pub fn selected_action(&self) -> Option<usize> {
        self.selected_action
    }

    pub fn selected_detail_record(&self) -> Option<&R> {
        self.selected_detail.and_then(|index| self.get(index))
    }

    pub fn selected_action_record(&self) -> Option<&R> {
        self.selected_action.and_then(|index| self.get(index))
    }

    fn check_selection(&self, index: Option<usize>) -> Result<Option<usize>, ViewError> {
        match index {
            Some(index) if index >= self.filtered.len() => Err(ViewError::IndexOutOfRange {
                index,
                len: self.filtered.len(),
            }),
            other => Ok(other),
        }
    }

    fn after_mutation(&mut self) {
        self.refilter();
        self.offset = self.offset.min(self.last_page_offset());
        self.clear_selections();
    }

    fn last_page_offset(&self) -> usize {
        match self.filtered.len() {
            0 => 0,
            len => (len - 1) / self.page_size * self.page_size,
        }
    }

    fn clear_selections(&mut self) {
        self.selected_detail = None;
        self.selected_action = None;
    }

    fn refilter(&mut self) {
        if self.filter_query.trim().is_empty() {
            self.filtered = (0..self.records.len()).collect();
            return;
        }

        let needle = self.filter_query.to_lowercase();
        let filtered = self
            .records
            .iter()
            .enumerate()
            .filter(|(_, record)| {
                self.search_fields
                    .iter()
                    .any(|field| field(record).to_lowercase().contains(&needle))
            })
            .map(|(index, _)| index)
            .collect();
        self.filtered = filtered;
    }
}

#[cfg(test)]
mod tests {
    use super::{SearchField, TableView, ViewError};
    use anyhow::Result;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Article {
        title: String,
        tag: String,
    }

    fn article(title: &str) -> Article {
        Article {
            title: title.to_owned(),
            tag: String::new(),
        }
    }

    fn title(article: &Article) -> &str {
        &article.title
    }

    fn tag(article: &Article) -> &str {
        &article.tag
    }

    fn numbered(count: usize) -> Vec<Article> {
        (0..count).map(|n| article(&format!("record {n}"))).collect()
    }

    fn titles(page: Vec<&Article>) -> Vec<String> {
        page.into_iter().map(|row| row.title.clone()).collect()
    }

    fn help_articles() -> Vec<Article> {
        [
            "How to monitor EV battery health?",
            "Managing charging stations",
            "Firmware update process",
            "Troubleshooting battery overheating",
        ]
        .into_iter()
        .map(article)
        .collect()
    }

    fn searchable() -> Vec<SearchField<Article>> {
        vec![title, tag]
    }

    #[test]
    fn zero_page_size_is_invalid_configuration() {
        let error = TableView::new(numbered(3), 0, searchable()).expect_err("page size 0");
        assert_eq!(error, ViewError::InvalidConfiguration { page_size: 0 });
        assert!(error.to_string().contains("at least 1"));
    }

    #[test]
    fn new_view_starts_on_first_page_without_selection() -> Result<()> {
        let view = TableView::new(numbered(7), 5, searchable())?;
        assert_eq!(view.offset(), 0);
        assert_eq!(view.filter_query(), "");
        assert_eq!(view.selected_detail(), None);
        assert_eq!(view.selected_action(), None);
        assert_eq!(view.page_number(), 1);
        assert_eq!(view.page_count(), 2);
        Ok(())
    }

    #[test]
    fn ten_records_page_five_advances_once_then_saturates() -> Result<()> {
        let records = numbered(10);
        let mut view = TableView::new(records.clone(), 5, searchable())?;

        assert_eq!(view.current_page(), records[0..5].iter().collect::<Vec<_>>());
        assert!(view.advance());
        assert_eq!(view.offset(), 5);
        assert_eq!(view.current_page(), records[5..10].iter().collect::<Vec<_>>());

        assert!(!view.advance());
        assert_eq!(view.offset(), 5);
        assert_eq!(view.current_page(), records[5..10].iter().collect::<Vec<_>>());
        Ok(())
    }

    #[test]
    fn short_collection_fits_one_page() -> Result<()> {
        let mut view = TableView::new(numbered(3), 5, searchable())?;
        assert_eq!(view.current_page().len(), 3);
        assert!(!view.advance());
        assert_eq!(view.offset(), 0);
        assert!(!view.has_next_page());
        Ok(())
    }

    #[test]
    fn retreat_is_noop_at_start_and_undoes_advance() -> Result<()> {
        let mut view = TableView::new(numbered(12), 5, searchable())?;
        assert!(!view.retreat());
        assert_eq!(view.offset(), 0);

        assert!(view.advance());
        assert!(view.advance());
        assert_eq!(view.offset(), 10);
        assert_eq!(view.current_page().len(), 2);

        assert!(view.retreat());
        assert_eq!(view.offset(), 5);
        assert!(view.retreat());
        assert_eq!(view.offset(), 0);
        Ok(())
    }

    #[test]
    fn paging_visits_every_record_once_for_all_sizes() -> Result<()> {
        for len in 0..=23 {
            for page_size in 1..=7 {
                let records = numbered(len);
                let mut view = TableView::new(records.clone(), page_size, searchable())?;
                assert_eq!(view.page_count(), len.div_ceil(page_size));

                let mut seen = Vec::new();
                loop {
                    let page = view.current_page();
                    assert!(page.len() <= page_size);
                    seen.extend(page.into_iter().cloned());
                    if !view.advance() {
                        break;
                    }
                }
                assert_eq!(seen, records, "len={len} page_size={page_size}");
            }
        }
        Ok(())
    }

    #[test]
    fn filter_matches_case_insensitively() -> Result<()> {
        let mut view = TableView::new(help_articles(), 5, searchable())?;

        view.set_filter_query("firmware");
        assert_eq!(titles(view.current_page()), vec!["Firmware update process"]);

        view.set_filter_query("FIRMWARE");
        assert_eq!(titles(view.current_page()), vec!["Firmware update process"]);
        assert!(view.is_filtered());
        Ok(())
    }

    #[test]
    fn filter_checks_every_searchable_field() -> Result<()> {
        let mut records = help_articles();
        records[1].tag = "Stations".to_owned();
        let mut view = TableView::new(records, 5, searchable())?;

        view.set_filter_query("station");
        assert_eq!(titles(view.current_page()), vec!["Managing charging stations"]);

        let mut title_only = TableView::new(
            vec![Article {
                title: "Alerts".to_owned(),
                tag: "battery".to_owned(),
            }],
            5,
            vec![title],
        )?;
        title_only.set_filter_query("battery");
        assert_eq!(title_only.filtered_len(), 0);
        Ok(())
    }

    #[test]
    fn blank_query_restores_full_collection_in_order() -> Result<()> {
        let records = help_articles();
        let mut view = TableView::new(records.clone(), 2, searchable())?;

        view.set_filter_query("battery");
        assert_eq!(view.filtered_len(), 2);

        for blank in ["", "   ", "\t"] {
            view.set_filter_query(blank);
            assert_eq!(view.filtered().cloned().collect::<Vec<_>>(), records);
            assert!(!view.is_filtered());
        }
        Ok(())
    }

    #[test]
    fn filter_without_matches_is_empty_not_error() -> Result<()> {
        let mut view = TableView::new(help_articles(), 5, searchable())?;
        view.set_filter_query("zzz");
        assert_eq!(view.filtered_len(), 0);
        assert!(view.current_page().is_empty());
        assert_eq!(view.page_count(), 0);
        assert_eq!(view.page_number(), 0);
        assert!(!view.advance());
        assert!(!view.retreat());
        Ok(())
    }

    #[test]
    fn filter_change_resets_offset_and_selections() -> Result<()> {
        let mut view = TableView::new(numbered(12), 5, searchable())?;
        view.advance();
        view.select_detail(Some(6))?;
        view.select_action(Some(7))?;

        view.set_filter_query("record");
        assert_eq!(view.offset(), 0);
        assert_eq!(view.selected_detail(), None);
        assert_eq!(view.selected_action(), None);
        Ok(())
    }

    #[test]
    fn selection_is_bounded_by_filtered_collection() -> Result<()> {
        let mut view = TableView::new(numbered(3), 5, searchable())?;

        view.select_detail(Some(2))?;
        assert_eq!(view.selected_detail(), Some(2));
        assert_eq!(
            view.selected_detail_record().map(|row| row.title.as_str()),
            Some("record 2")
        );

        let error = view.select_detail(Some(5)).expect_err("index 5 of 3");
        assert_eq!(error, ViewError::IndexOutOfRange { index: 5, len: 3 });
        assert_eq!(view.selected_detail(), Some(2));

        view.set_filter_query("x");
        assert_eq!(view.filtered_len(), 0);
        assert_eq!(view.selected_detail(), None);
        Ok(())
    }

    #[test]
    fn selection_may_point_outside_current_page() -> Result<()> {
        let mut view = TableView::new(numbered(9), 3, searchable())?;
        view.select_action(Some(8))?;
        assert_eq!(view.selected_action(), Some(8));
        assert!(!view.page_range().contains(&8));
        Ok(())
    }

    #[test]
    fn detail_and_action_slots_are_independent() -> Result<()> {
        let mut view = TableView::new(numbered(4), 5, searchable())?;
        view.select_detail(Some(1))?;
        view.select_action(Some(3))?;
        assert_eq!(view.selected_detail(), Some(1));
        assert_eq!(view.selected_action(), Some(3));

        view.select_detail(None)?;
        assert_eq!(view.selected_detail(), None);
        assert_eq!(view.selected_action(), Some(3));
        assert!(view.select_action(Some(4)).is_err());
        Ok(())
    }

    #[test]
    fn selection_indexes_filtered_rows() -> Result<()> {
        let mut view = TableView::new(help_articles(), 5, searchable())?;
        view.set_filter_query("battery");
        view.select_detail(Some(1))?;
        assert_eq!(
            view.selected_detail_record().map(|row| row.title.as_str()),
            Some("Troubleshooting battery overheating")
        );
        assert_eq!(view.source_index(1), Some(3));
        assert!(view.select_detail(Some(2)).is_err());
        Ok(())
    }

    #[test]
    fn replace_collection_keeps_filter_and_clamps_offset() -> Result<()> {
        let mut view = TableView::new(numbered(20), 5, searchable())?;
        view.set_filter_query("record 1");
        assert_eq!(view.filtered_len(), 11);
        view.advance();
        view.advance();
        assert_eq!(view.offset(), 10);
        view.select_detail(Some(10))?;

        view.replace_collection(numbered(12));
        assert_eq!(view.filter_query(), "record 1");
        assert_eq!(view.filtered_len(), 3);
        assert_eq!(view.offset(), 0);
        assert_eq!(view.selected_detail(), None);
        Ok(())
    }

    #[test]
    fn shrinking_collection_clamps_to_last_page_start() -> Result<()> {
        let mut view = TableView::new(numbered(23), 5, searchable())?;
        while view.advance() {}
        assert_eq!(view.offset(), 20);

        view.replace_collection(numbered(11));
        assert_eq!(view.offset(), 10);
        assert_eq!(view.current_page().len(), 1);

        view.replace_collection(numbered(10));
        assert_eq!(view.offset(), 5);

        view.replace_collection(Vec::new());
        assert_eq!(view.offset(), 0);
        assert!(view.current_page().is_empty());
        Ok(())
    }

    #[test]
    fn append_and_remove_clear_selections() -> Result<()> {
        let mut view = TableView::new(numbered(5), 5, searchable())?;
        view.select_detail(Some(0))?;
        view.select_action(Some(1))?;

        view.append(article("record 5"));
        assert_eq!(view.len(), 6);
        assert_eq!(view.page_count(), 2);
        assert_eq!(view.selected_detail(), None);
        assert_eq!(view.selected_action(), None);

        view.advance();
        view.select_detail(Some(5))?;
        let removed = view.remove_at(5)?;
        assert_eq!(removed.title, "record 5");
        assert_eq!(view.offset(), 0);
        assert_eq!(view.selected_detail(), None);

        assert_eq!(
            view.remove_at(9).expect_err("out of range"),
            ViewError::IndexOutOfRange { index: 9, len: 5 }
        );
        Ok(())
    }

    #[test]
    fn remove_where_drops_matching_records() -> Result<()> {
        let mut view = TableView::new(help_articles(), 2, searchable())?;
        view.advance();
        let removed = view.remove_where(|row| row.title.contains("battery"));
        assert_eq!(removed, 2);
        assert_eq!(view.len(), 2);
        assert_eq!(view.offset(), 0);
        assert_eq!(
            titles(view.current_page()),
            vec!["Managing charging stations", "Firmware update process"]
        );
        Ok(())
    }

    #[test]
    fn current_page_tolerates_stale_offset() -> Result<()> {
        let mut view = TableView::new(numbered(6), 5, searchable())?;
        view.advance();
        view.filtered.truncate(4);
        assert!(view.current_page().is_empty());
        assert_eq!(view.page_range(), 4..4);
        Ok(())
    }
}
