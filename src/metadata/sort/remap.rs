use rustc_hash::FxHashMap;

use crate::{
    metadata::{
        tables::{columns, ColumnType, TableId, TableStore, LIST_COLUMNS},
        token::Token,
    },
    Result,
};

/// One row that changed identity during a save
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TokenRemap {
    /// Token before the move
    pub from: Token,
    /// Token after the move
    pub to: Token,
    /// Set when `from` was folded into an equivalent `to` rather than moved to it
    pub duplicate: bool,
}

/// Consumer of remap events.
///
/// Any `FnMut(TokenRemap)` closure that is `Send + Sync` is a listener.
pub trait TokenRemapListener: Send + Sync {
    /// Called once per moved or folded row
    fn map_token(&mut self, remap: TokenRemap);
}

impl<F> TokenRemapListener for F
where
    F: FnMut(TokenRemap) + Send + Sync,
{
    fn map_token(&mut self, remap: TokenRemap) {
        self(remap);
    }
}

/// Where each moved row has ended up, keyed by its token before the first move
#[derive(Clone, Debug, Default)]
pub struct TokenMovementMap {
    current: FxHashMap<Token, Token>,
    original: FxHashMap<Token, Token>,
}

impl TokenMovementMap {
    /// Record a batch of simultaneous moves, each given as `(from, to)` in current tokens
    ///
    /// A row that already moved keeps its original token as the key.
    pub fn record(&mut self, moves: &[(Token, Token)]) {
        let resolved: Vec<(Token, Token)> = moves
            .iter()
            .map(|(from, to)| (self.original.remove(from).unwrap_or(*from), *to))
            .collect();

        for (origin, to) in resolved {
            self.current.insert(origin, to);
            self.original.insert(to, origin);
        }
    }

    /// Current token of a row known by its original token
    #[must_use]
    pub fn get(&self, token: Token) -> Option<Token> {
        self.current.get(&token).copied()
    }

    /// Number of moved rows
    #[must_use]
    pub fn len(&self) -> usize {
        self.current.len()
    }

    /// True if nothing moved
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    /// Forget every move
    pub fn clear(&mut self) {
        self.current.clear();
        self.original.clear();
    }
}

impl TableStore {
    /// Install the consumer of remap events, replacing any previous one
    pub fn set_token_remap_listener(&mut self, listener: impl TokenRemapListener + 'static) {
        self.listener = Some(Box::new(listener));
    }

    /// Remove and return the current remap listener
    pub fn take_token_remap_listener(&mut self) -> Option<Box<dyn TokenRemapListener>> {
        self.listener.take()
    }

    /// Moves accumulated since the last save
    #[must_use]
    pub fn movements(&self) -> &TokenMovementMap {
        &self.movements
    }

    pub(crate) fn notify_remap(&mut self, remap: TokenRemap) {
        log::trace!(
            "Remap {} -> {}{}",
            remap.from,
            remap.to,
            if remap.duplicate { " (folded)" } else { "" }
        );
        if let Some(listener) = self.listener.as_mut() {
            listener.map_token(remap);
        }
    }

    /// Record simultaneous row moves and report each of them
    pub(crate) fn record_moves(&mut self, moves: &[(Token, Token)]) {
        self.movements.record(moves);
        for (from, to) in moves {
            self.notify_remap(TokenRemap {
                from: *from,
                to: *to,
                duplicate: false,
            });
        }
    }

    /// Rewrite every RID and coded index column of `table` that references a moved row.
    ///
    /// List columns address logical child positions and are left alone.
    ///
    /// # Errors
    /// Returns [`crate::Error::ReadOnly`] or the errors of writing a column.
    pub fn fix_up_table(&mut self, table: TableId) -> Result<()> {
        ensure_writable!(self);
        if self.movements.is_empty() {
            return Ok(());
        }

        for (column, template) in columns(table).iter().enumerate() {
            if LIST_COLUMNS
                .iter()
                .any(|(parent, list, _)| *parent == table && *list == column)
            {
                continue;
            }

            for rid in 1..=self.row_count(table) {
                let value = self.get_column(table, column, rid)?;
                let replacement = match template.kind {
                    ColumnType::Rid(target) if value != 0 => self
                        .movements
                        .get(Token::from_parts(target, value))
                        .map(|moved| moved.row()),
                    ColumnType::Coded(kind) => match kind.decode(value) {
                        Ok(token) if !token.is_null() => match self.movements.get(token) {
                            Some(moved) => Some(kind.encode(moved)?),
                            None => None,
                        },
                        _ => None,
                    },
                    _ => None,
                };

                if let Some(replacement) = replacement {
                    self.write_column(table, column, rid, replacement)?;
                }
            }
        }

        self.lookups.invalidate_table(table);
        Ok(())
    }
}
