//! TaskPaper outline library.
//! Keeps the core pure: text goes in, a tree or text comes out. Reading and writing
//! files is left to the `taskpaper` binary.

pub mod core {
    use chrono::NaiveDate;
    use indexmap::IndexMap;
    use serde::{Deserialize, Serialize};
    use std::fmt;
    use std::ops::{Index, IndexMut};
    use tracing::debug;

    /* ------------------------------- IDs ------------------------------- */

    /// Stable handle of an item inside its `Document` arena.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct ItemId(pub usize);

    impl fmt::Display for ItemId {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "item #{}", self.0)
        }
    }

    /// Where an item hangs: under another item or directly under the document.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub enum Owner {
        Document,
        Item(ItemId),
    }

    /* ---------------------------- Value Objects ---------------------------- */

    /// Tag name to value, in first-occurrence order. `@flag` maps to an empty value.
    pub type Tags = IndexMap<String, String>;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum Kind {
        Task,
        Project,
        Note,
    }

    /* ------------------------------ Entities ------------------------------ */

    /// One line of a TaskPaper file.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize)]
    pub struct TaskItem {
        pub(crate) id: ItemId,
        /// Line exactly as read, leading tabs included.
        pub(crate) raw_text: String,
        pub(crate) trimmed_text: String,
        pub(crate) kind: Kind,
        pub(crate) tags: Tags,
        pub(crate) children: Vec<ItemId>,
        /// `None` while detached.
        pub(crate) parent: Option<Owner>,
        pub(crate) depth: usize,
    }

    impl TaskItem {
        pub(crate) fn new(
            id: ItemId,
            raw_text: String,
            kind: Kind,
            tags: Tags,
            depth: usize,
        ) -> Self {
            let trimmed_text = raw_text.trim().to_string();
            Self {
                id,
                raw_text,
                trimmed_text,
                kind,
                tags,
                children: vec![],
                parent: None,
                depth,
            }
        }

        pub fn id(&self) -> ItemId {
            self.id
        }

        pub fn raw_text(&self) -> &str {
            &self.raw_text
        }

        /// Line content without surrounding whitespace.
        pub fn text(&self) -> &str {
            &self.trimmed_text
        }

        pub fn kind(&self) -> Kind {
            self.kind
        }

        pub fn tags(&self) -> &Tags {
            &self.tags
        }

        pub fn children(&self) -> &[ItemId] {
            &self.children
        }

        pub fn parent(&self) -> Option<Owner> {
            self.parent
        }

        pub fn depth(&self) -> usize {
            self.depth
        }

        pub fn is_task(&self) -> bool {
            self.kind == Kind::Task
        }

        pub fn is_project(&self) -> bool {
            self.kind == Kind::Project
        }

        pub fn is_note(&self) -> bool {
            self.kind == Kind::Note
        }

        /// Whitespace-only line.
        pub fn is_blank(&self) -> bool {
            self.trimmed_text.is_empty()
        }

        pub fn has_tag(&self, name: &str) -> bool {
            self.tags.contains_key(name)
        }

        pub fn tag(&self, name: &str) -> Option<&str> {
            self.tags.get(name).map(String::as_str)
        }

        /// Sets `name` to `value`. An existing tag keeps its position.
        pub fn add_tag(
            &mut self,
            name: impl Into<String>,
            value: impl Into<String>,
        ) -> Option<String> {
            self.tags.insert(name.into(), value.into())
        }

        /// Removes `name`, keeping the order of the remaining tags.
        pub fn drop_tag(&mut self, name: &str) -> bool {
            self.tags.shift_remove(name).is_some()
        }

        pub fn is_done(&self) -> bool {
            self.has_tag(DONE_TAG)
        }

        /// Completion date from `@done(YYYY-MM-DD)`, if the value parses.
        pub fn done_date(&self) -> Option<NaiveDate> {
            let value = self.tag(DONE_TAG)?;
            NaiveDate::parse_from_str(value.trim(), DONE_DATE_FORMAT).ok()
        }

        pub fn mark_done(&mut self, date: NaiveDate) -> Option<String> {
            self.add_tag(DONE_TAG, date.format(DONE_DATE_FORMAT).to_string())
        }
    }

    pub const DONE_TAG: &str = "done";
    const DONE_DATE_FORMAT: &str = "%Y-%m-%d";

    /* ------------------------------ Aggregate ------------------------------ */

    /// Aggregate root: one TaskPaper file. Items live in an arena; `roots` lists
    /// the top-level ones in file order.
    #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
    pub struct Document {
        items: Vec<TaskItem>,
        roots: Vec<ItemId>,
    }

    impl Document {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn roots(&self) -> &[ItemId] {
            &self.roots
        }

        pub fn is_empty(&self) -> bool {
            self.roots.is_empty()
        }

        pub fn get(&self, id: ItemId) -> Option<&TaskItem> {
            self.items.get(id.0)
        }

        pub fn get_mut(&mut self, id: ItemId) -> Option<&mut TaskItem> {
            self.items.get_mut(id.0)
        }

        /// Parses `line` into a new detached item. Attach it with [`Document::add_item`].
        pub fn create_item(&mut self, line: &str) -> ItemId {
            let id = ItemId(self.items.len());
            self.items.push(crate::parser::parse_item(id, line));
            id
        }

        pub fn children_of(&self, owner: Owner) -> &[ItemId] {
            match owner {
                Owner::Document => &self.roots,
                Owner::Item(id) => &self.items[id.0].children,
            }
        }

        fn children_of_mut(&mut self, owner: Owner) -> &mut Vec<ItemId> {
            match owner {
                Owner::Document => &mut self.roots,
                Owner::Item(id) => &mut self.items[id.0].children,
            }
        }

        /// Parent ids of `id`, nearest first, stopping below the document.
        pub fn ancestors(&self, id: ItemId) -> Ancestors<'_> {
            let next = match self.get(id).and_then(TaskItem::parent) {
                Some(Owner::Item(parent)) => Some(parent),
                _ => None,
            };
            Ancestors { doc: self, next }
        }

        /// Distance from the top level by parent links; 0 for top-level items.
        pub fn level(&self, id: ItemId) -> usize {
            self.ancestors(id).count()
        }

        /// Appends `item` to the children of `parent`, moving it if it is attached
        /// elsewhere. The moved subtree is re-indented to sit one level below `parent`.
        pub fn add_item(&mut self, parent: Owner, item: ItemId) -> Result<(), DomainError> {
            self.ensure_known(item)?;
            if let Owner::Item(parent_id) = parent {
                self.ensure_known(parent_id)?;
                if parent_id == item || self.ancestors(parent_id).any(|a| a == item) {
                    debug!(%item, parent = %parent_id, "rejected add_item: would create a cycle");
                    return Err(DomainError::CycleDetected {
                        item,
                        parent: parent_id,
                    });
                }
            }

            if self.items[item.0].parent.is_some() {
                self.remove_item(item)?;
            }
            self.attach(parent, item);

            let target = self.child_depth(parent);
            if self.items[item.0].depth != target {
                self.reindent(item, target);
            }
            Ok(())
        }

        /// Detaches `item` from its parent. The subtree stays intact and can be re-added.
        pub fn remove_item(&mut self, item: ItemId) -> Result<(), DomainError> {
            self.ensure_known(item)?;
            let owner = self.items[item.0]
                .parent
                .ok_or(DomainError::NotFound(item))?;
            let siblings = self.children_of_mut(owner);
            let pos = siblings
                .iter()
                .position(|c| *c == item)
                .ok_or(DomainError::NotFound(item))?;
            siblings.remove(pos);
            self.items[item.0].parent = None;
            Ok(())
        }

        /// Unchecked append used while building from text.
        pub(crate) fn attach(&mut self, owner: Owner, item: ItemId) {
            self.children_of_mut(owner).push(item);
            self.items[item.0].parent = Some(owner);
        }

        fn child_depth(&self, owner: Owner) -> usize {
            match owner {
                Owner::Document => 0,
                Owner::Item(id) => self.items[id.0].depth + 1,
            }
        }

        fn reindent(&mut self, root: ItemId, target: usize) {
            let delta = target as isize - self.items[root.0].depth as isize;
            let mut stack = vec![root];
            while let Some(id) = stack.pop() {
                let item = &mut self.items[id.0];
                item.depth = (item.depth as isize + delta).max(0) as usize;
                stack.extend(item.children.iter().copied());
            }
        }

        fn ensure_known(&self, id: ItemId) -> Result<(), DomainError> {
            if id.0 < self.items.len() {
                Ok(())
            } else {
                Err(DomainError::UnknownItem(id))
            }
        }
    }

    impl Index<ItemId> for Document {
        type Output = TaskItem;

        fn index(&self, id: ItemId) -> &TaskItem {
            &self.items[id.0]
        }
    }

    impl IndexMut<ItemId> for Document {
        fn index_mut(&mut self, id: ItemId) -> &mut TaskItem {
            &mut self.items[id.0]
        }
    }

    pub struct Ancestors<'a> {
        doc: &'a Document,
        next: Option<ItemId>,
    }

    impl Iterator for Ancestors<'_> {
        type Item = ItemId;

        fn next(&mut self) -> Option<ItemId> {
            let current = self.next?;
            self.next = match self.doc[current].parent {
                Some(Owner::Item(parent)) => Some(parent),
                _ => None,
            };
            Some(current)
        }
    }

    /* ---------------------------- Errors (domain) ---------------------------- */

    #[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
    pub enum DomainError {
        #[error("adding {item} under {parent} would create a cycle")]
        CycleDetected { item: ItemId, parent: ItemId },
        #[error("{0} is not attached to a parent that lists it")]
        NotFound(ItemId),
        #[error("{0} does not belong to this document")]
        UnknownItem(ItemId),
    }

}

pub mod parser {
    //! Line-oriented TaskPaper parser.
    //!
    //! Every line becomes one item. Ownership comes from leading tabs only:
    //! the builder keeps the previously attached item and climbs its parent
    //! links to find the owner of the next line. Tags are recognized with `nom`.

    use crate::core::*;
    use nom::{
        IResult,
        bytes::complete::{take_till, take_till1},
        character::complete::char,
        combinator::opt,
        sequence::delimited,
    };
    use std::{convert::Infallible, ops::Range, str::FromStr};
    use tracing::{debug, trace};

    /* ------------------------ Public entry points ------------------------ */

    /// Parse a whole TaskPaper document. Lines are split on `\n`; never fails.
    pub fn parse_taskpaper(input: &str) -> Document {
        build(input.split('\n'))
    }

    /// Assemble a document from lines, one item per line.
    ///
    /// A line deeper than the previous one becomes its child, even when it
    /// jumps more than one level. A line at the same depth becomes its sibling,
    /// and a shallower line climbs parent links until it finds an item with a
    /// smaller depth (or the document). Blank lines are ordinary items at their
    /// own tab depth, so an empty line sends the next indented line under it.
    pub fn build<I>(lines: I) -> Document
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut doc = Document::new();
        let mut prev: Option<ItemId> = None;
        let mut count = 0usize;
        let mut clamped = 0usize;

        for (idx, line) in lines.into_iter().enumerate() {
            count += 1;
            let id = doc.create_item(line.as_ref());
            let depth = doc[id].depth();
            let owner = match prev {
                None => Owner::Document,
                Some(p) => {
                    let prev_depth = doc[p].depth();
                    if depth > prev_depth + 1 {
                        clamped += 1;
                        trace!(line = idx + 1, depth, prev_depth, "indentation jump clamped");
                    }
                    owner_for_depth(&doc, p, depth)
                }
            };
            doc.attach(owner, id);
            prev = Some(id);
        }

        debug!(lines = count, roots = doc.roots().len(), clamped, "built taskpaper document");
        doc
    }

    impl FromStr for Document {
        type Err = Infallible;

        fn from_str(s: &str) -> Result<Self, Self::Err> {
            Ok(parse_taskpaper(s))
        }
    }

    /// Nearest item on the way up from `prev` whose depth is below `depth`.
    fn owner_for_depth(doc: &Document, prev: ItemId, depth: usize) -> Owner {
        let mut candidate = Owner::Item(prev);
        loop {
            match candidate {
                Owner::Document => return Owner::Document,
                Owner::Item(id) => {
                    let item = &doc[id];
                    if item.depth() < depth {
                        return candidate;
                    }
                    candidate = item.parent().unwrap_or(Owner::Document);
                }
            }
        }
    }

    pub(crate) fn parse_item(id: ItemId, line: &str) -> TaskItem {
        let trimmed = line.trim();
        TaskItem::new(
            id,
            line.to_string(),
            classify(trimmed),
            extract_tags(trimmed),
            indent_level(line),
        )
    }

    /* ------------------------------- Utils ------------------------------- */

    /// Count of leading tab characters.
    pub fn indent_level(line: &str) -> usize {
        line.chars().take_while(|c| *c == '\t').count()
    }

    /// Classify already-trimmed line content.
    pub fn classify(trimmed: &str) -> Kind {
        if trimmed.starts_with("- ") {
            Kind::Task
        } else if strip_trailing_tags(trimmed).ends_with(':') {
            Kind::Project
        } else {
            Kind::Note
        }
    }

    /// `text` with any run of tags at the end removed, e.g. `"Errands: @home"` -> `"Errands:"`.
    pub fn strip_trailing_tags(text: &str) -> &str {
        let mut end = text.trim_end().len();
        for tag in scan_tags(text).iter().rev() {
            if tag.range.end != end {
                break;
            }
            end = text[..tag.range.start].trim_end().len();
        }
        &text[..end]
    }

    /* ------------------------------- Tags ------------------------------- */

    /// One tag occurrence and the byte range it covers in the scanned line.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct TagMatch<'a> {
        pub name: &'a str,
        /// `None` for a bare `@name`.
        pub value: Option<&'a str>,
        pub range: Range<usize>,
    }

    /// All tag occurrences in `line`, left to right, duplicates included.
    pub fn scan_tags(line: &str) -> Vec<TagMatch<'_>> {
        let mut out = Vec::new();
        let mut pos = 0;
        while let Some(offset) = line[pos..].find('@') {
            let start = pos + offset;
            match tag_annotation(&line[start..]) {
                Ok((rest, (name, value))) => {
                    let end = line.len() - rest.len();
                    out.push(TagMatch {
                        name,
                        value,
                        range: start..end,
                    });
                    pos = end;
                }
                Err(_) => pos = start + 1,
            }
        }
        out
    }

    /// Tags of `line` as an ordered map. A repeated name keeps its first slot
    /// and takes the last value.
    pub fn extract_tags(line: &str) -> Tags {
        let mut tags = Tags::new();
        for tag in scan_tags(line) {
            tags.insert(tag.name.to_string(), tag.value.unwrap_or_default().to_string());
        }
        tags
    }

    type PResult<'a, T> = IResult<&'a str, T>;

    /// `@name` or `@name(value)`. An unclosed `(` is left out of the tag.
    fn tag_annotation(i: &str) -> PResult<'_, (&str, Option<&str>)> {
        let (i, _) = char('@')(i)?;
        let (i, name) = take_till1(|c: char| c.is_whitespace() || c == '(')(i)?;
        let (i, value) = opt(delimited(
            char('('),
            take_till(|c: char| c == ')' || c == '\n'),
            char(')'),
        ))(i)?;
        Ok((i, (name, value)))
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn pairs(tags: &Tags) -> Vec<(&str, &str)> {
            tags.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect()
        }

        #[test]
        fn classifies_tasks_projects_and_notes() {
            assert_eq!(classify("- buy milk"), Kind::Task);
            assert_eq!(classify("Groceries:"), Kind::Project);
            assert_eq!(classify("remember to call mom"), Kind::Note);
            assert_eq!(classify("Errands: @home @today"), Kind::Project);
            assert_eq!(classify("- ask: why?:"), Kind::Task);
            assert_eq!(classify("-asdf"), Kind::Note);
            assert_eq!(classify("Call: tomorrow"), Kind::Note);
            assert_eq!(classify(""), Kind::Note);
        }

        #[test]
        fn extracts_tags_in_order() {
            let tags = extract_tags("- buy milk @done(2020-01-01) @errand");
            assert_eq!(pairs(&tags), vec![("done", "2020-01-01"), ("errand", "")]);
        }

        #[test]
        fn skips_malformed_tag_text() {
            let tags = extract_tags("asdf @foo @ (@bar(baz))(");
            assert_eq!(pairs(&tags), vec![("foo", ""), ("bar", "baz")]);
            assert!(extract_tags("no tags here").is_empty());
            assert!(extract_tags("trailing @").is_empty());
        }

        #[test]
        fn unclosed_paren_gives_empty_value() {
            let found = scan_tags("x @due(monday");
            assert_eq!(found.len(), 1);
            assert_eq!(found[0].name, "due");
            assert_eq!(found[0].value, None);
            assert_eq!(found[0].range, 2..6);
        }

        #[test]
        fn repeated_tag_keeps_first_slot_last_value() {
            let tags = extract_tags("@a(1) @b @a(2)");
            assert_eq!(pairs(&tags), vec![("a", "2"), ("b", "")]);
        }

        #[test]
        fn values_may_contain_spaces() {
            let tags = extract_tags("- meet @with(Ann and Bo) @at(3pm)");
            assert_eq!(pairs(&tags), vec![("with", "Ann and Bo"), ("at", "3pm")]);
        }

        #[test]
        fn builds_ownership_from_tabs() {
            let doc = build(["A:", "\t- sub1", "\t\t- subsub1", "\t- sub2"]);
            assert_eq!(doc.roots().len(), 1);
            let a = doc.roots()[0];
            let children = doc[a].children();
            assert_eq!(children.len(), 2);
            let (sub1, sub2) = (children[0], children[1]);
            assert_eq!(doc[sub1].text(), "- sub1");
            assert_eq!(doc[sub2].text(), "- sub2");
            assert_eq!(doc[sub1].children().len(), 1);
            let subsub1 = doc[sub1].children()[0];
            assert_eq!(doc[subsub1].text(), "- subsub1");
            assert_eq!(doc[subsub1].parent(), Some(Owner::Item(sub1)));
            assert_eq!(doc[sub2].parent(), doc[sub1].parent());
        }

        #[test]
        fn deep_jump_is_clamped_to_child() {
            let doc = parse_taskpaper("A:\n\t\t\t- deep\n\t\t\t- deep sibling\n\t- back");
            let a = doc.roots()[0];
            let kids: Vec<&str> = doc[a].children().iter().map(|id| doc[*id].text()).collect();
            assert_eq!(kids, vec!["- deep", "- deep sibling", "- back"]);
            assert_eq!(doc[doc[a].children()[0]].depth(), 3);
        }

        #[test]
        fn shallower_line_climbs_to_matching_ancestor() {
            let doc = parse_taskpaper("A:\n\t- b\n\t\t- c\n\t\t\t- d\n\t- e\nF:");
            let a = doc.roots()[0];
            assert_eq!(doc.roots().len(), 2);
            let kids: Vec<&str> = doc[a].children().iter().map(|id| doc[*id].text()).collect();
            assert_eq!(kids, vec!["- b", "- e"]);
        }

        #[test]
        fn blank_line_is_a_top_level_item() {
            let input = "A:\n\t- one\n\n\t- two";
            let doc = parse_taskpaper(input);
            assert_eq!(doc.roots().len(), 2);
            let (a, blank) = (doc.roots()[0], doc.roots()[1]);
            assert!(doc[blank].is_blank());
            assert_eq!(doc[blank].depth(), 0);
            assert_eq!(doc[a].children().len(), 1);

            let two = doc[blank].children()[0];
            assert_eq!(doc[two].text(), "- two");
            assert_eq!(doc[two].parent(), Some(Owner::Item(blank)));
            assert_eq!(doc.to_string(), input);
        }

        #[test]
        fn parent_is_one_level_shallower() {
            let doc = parse_taskpaper("A:\n\t- one\n\n\t- two\n\t\t- three\n\nB:\n\t- four\n");
            for item in doc.iter() {
                match item.parent() {
                    Some(Owner::Item(parent)) => {
                        assert_eq!(doc[parent].depth() + 1, item.depth())
                    }
                    Some(Owner::Document) => assert_eq!(item.depth(), 0),
                    None => panic!("built item without parent: {:?}", item.text()),
                }
            }
        }

        #[test]
        fn first_line_indented_is_top_level() {
            let doc = parse_taskpaper("\t\t- stray\n\t\t\t- under stray\n- next");
            assert_eq!(doc.roots().len(), 2);
            let stray = doc.roots()[0];
            assert_eq!(doc[stray].depth(), 2);
            assert_eq!(doc[stray].children().len(), 1);
        }

        #[test]
        fn from_str_matches_parse() {
            let doc: Document = "Home:\n\t- sweep".parse().expect("infallible");
            assert_eq!(doc, parse_taskpaper("Home:\n\t- sweep"));
        }
    }
}

pub mod select {
    //! Predicate search over a document in pre-order.

    use crate::core::*;

    /// Pre-order walk over the items reachable from the document roots.
    pub struct PreOrder<'a> {
        doc: &'a Document,
        stack: Vec<ItemId>,
    }

    impl<'a> Iterator for PreOrder<'a> {
        type Item = &'a TaskItem;

        fn next(&mut self) -> Option<&'a TaskItem> {
            let id = self.stack.pop()?;
            let item = &self.doc[id];
            self.stack.extend(item.children().iter().rev().copied());
            Some(item)
        }
    }

    impl Document {
        pub fn iter(&self) -> PreOrder<'_> {
            PreOrder {
                doc: self,
                stack: self.roots().iter().rev().copied().collect(),
            }
        }

        pub fn select<F>(&self, predicate: F) -> Vec<ItemId>
        where
            F: Fn(&TaskItem) -> bool,
        {
            select(self, predicate)
        }

        pub fn select_by_tag(&self, name: &str) -> Vec<ItemId> {
            select_by_tag(self, name)
        }
    }

    pub fn select<F>(doc: &Document, predicate: F) -> Vec<ItemId>
    where
        F: Fn(&TaskItem) -> bool,
    {
        doc.iter()
            .filter(|item| predicate(*item))
            .map(TaskItem::id)
            .collect()
    }

    /// Items carrying `name`, whatever its value.
    pub fn select_by_tag(doc: &Document, name: &str) -> Vec<ItemId> {
        select(doc, has_tag(name))
    }

    pub fn has_tag(name: &str) -> impl Fn(&TaskItem) -> bool + '_ {
        move |item: &TaskItem| item.has_tag(name)
    }

    pub fn is_kind(kind: Kind) -> impl Fn(&TaskItem) -> bool {
        move |item: &TaskItem| item.kind() == kind
    }

}

pub mod format {
    //! Text reconstruction.
    //!
    //! Untouched items are written back from their raw line, so an unmodified
    //! document formats to exactly the text it was parsed from. Items whose tags
    //! were changed are re-rendered from their text and tag map.

    use crate::core::*;
    use crate::parser::{extract_tags, indent_level, scan_tags};
    use indexmap::IndexMap;
    use serde::{Deserialize, Serialize};
    use std::{borrow::Cow, collections::HashSet, fmt};

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(default)]
    pub struct FormatOptions {
        /// When filtering, also emit every ancestor of a match.
        pub include_ancestors: bool,
        /// Emit leading tabs. Off gives flat, unindented lines.
        pub render_tabs: bool,
    }

    impl Default for FormatOptions {
        fn default() -> Self {
            Self {
                include_ancestors: true,
                render_tabs: true,
            }
        }
    }

    pub fn format_document(doc: &Document, options: &FormatOptions) -> String {
        doc.iter()
            .map(|item| render_item(item, options.render_tabs))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Excerpt of `doc` with the items matching `predicate`, each at its
    /// original indentation and in document order.
    pub fn format_filtered<F>(doc: &Document, predicate: F, options: &FormatOptions) -> String
    where
        F: Fn(&TaskItem) -> bool,
    {
        let mut visible: HashSet<ItemId> = HashSet::new();
        for id in doc.select(predicate) {
            visible.insert(id);
            if options.include_ancestors {
                visible.extend(doc.ancestors(id));
            }
        }

        doc.iter()
            .filter(|item| visible.contains(&item.id()))
            .map(|item| render_item(item, options.render_tabs))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn render_item(item: &TaskItem, render_tabs: bool) -> String {
        let raw = item.raw_text();
        let body: Cow<'_, str> = if tags_match_source(item) {
            Cow::Borrowed(&raw[indent_level(raw)..])
        } else {
            Cow::Owned(render_body(item, &raw[indent_level(raw)..]))
        };

        let mut out = String::new();
        if render_tabs {
            out.push_str(&"\t".repeat(item.depth()));
        }
        out.push_str(&body);
        out
    }

    /// `@name` / `@name(value)` joined by spaces, in map order.
    pub fn render_tags(tags: &Tags) -> String {
        tags.iter()
            .map(|(name, value)| {
                if value.is_empty() {
                    format!("@{name}")
                } else {
                    format!("@{name}({value})")
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn tags_match_source(item: &TaskItem) -> bool {
        extract_tags(item.text()).iter().eq(item.tags().iter())
    }

    /// Rebuilds the text after the tabs. Whitespace before the content and
    /// after it (spaces, a CR from CRLF input) is copied from `raw_body`.
    fn render_body(item: &TaskItem, raw_body: &str) -> String {
        let lead = raw_body.len() - raw_body.trim_start().len();
        let content_end = lead + raw_body[lead..].trim_end().len();

        let mut text = base_text(item.text());
        let tags = render_tags(item.tags());
        if !tags.is_empty() {
            if !text.is_empty() && !text.ends_with(' ') {
                text.push(' ');
            }
            text.push_str(&tags);
        }

        let mut out = String::with_capacity(raw_body.len() + text.len());
        out.push_str(&raw_body[..lead]);
        out.push_str(&text);
        out.push_str(&raw_body[content_end..]);
        out
    }

    /// Line text with every tag annotation cut out.
    fn base_text(text: &str) -> String {
        let mut pieces = Vec::new();
        let mut cursor = 0;
        for tag in scan_tags(text) {
            pieces.push(text[cursor..tag.range.start].trim());
            cursor = tag.range.end;
        }
        pieces.push(text[cursor..].trim());

        let mut base = pieces
            .into_iter()
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        // keep the task marker intact when only tags followed it
        if base == "-" && text.starts_with("- ") {
            base.push(' ');
        }
        base
    }

    impl fmt::Display for Document {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(&format_document(self, &FormatOptions::default()))
        }
    }

    impl fmt::Display for TaskItem {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(&render_item(self, false))
        }
    }

    /* ------------------------------ Outline export ------------------------------ */

    /// Nested, owned view of a document for JSON export.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct OutlineNode {
        pub kind: Kind,
        pub text: String,
        pub depth: usize,
        #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
        pub tags: Tags,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        pub children: Vec<OutlineNode>,
    }

    pub fn outline(doc: &Document) -> Vec<OutlineNode> {
        fn node(doc: &Document, id: ItemId) -> OutlineNode {
            let item = &doc[id];
            OutlineNode {
                kind: item.kind(),
                text: item.text().to_string(),
                depth: item.depth(),
                tags: item.tags().clone(),
                children: item.children().iter().map(|c| node(doc, *c)).collect(),
            }
        }
        doc.roots().iter().map(|id| node(doc, *id)).collect()
    }

}

pub use crate::core::{Document, DomainError, ItemId, Kind, Owner, TaskItem, Tags};
pub use format::{FormatOptions, format_document, format_filtered};
pub use parser::{build, classify, extract_tags, parse_taskpaper};
pub use select::{has_tag, is_kind, select, select_by_tag};
