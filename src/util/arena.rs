//! Generational arena for runtime records.
//!
//! Task and scope records are stored in arenas and referenced by
//! index + generation handles. The generation counter detects stale
//! handles after a slot has been reaped and reused.

use core::fmt;

/// An index into an arena, paired with a generation counter.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArenaIndex {
    index: u32,
    generation: u32,
}

impl ArenaIndex {
    /// Creates a new arena index.
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Returns the raw slot index.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Returns the generation counter.
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for ArenaIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArenaIndex({}:{})", self.index, self.generation)
    }
}

#[derive(Debug)]
enum Entry<T> {
    Occupied { value: T, generation: u32 },
    Vacant { next_free: Option<u32>, generation: u32 },
}

/// A generational arena.
///
/// Freed slots are linked into a free list and reused with a bumped
/// generation, so a handle to a reaped record never resolves again.
#[derive(Debug)]
pub struct Arena<T> {
    entries: Vec<Entry<T>>,
    free_head: Option<u32>,
    len: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    /// Creates a new empty arena.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
            free_head: None,
            len: 0,
        }
    }

    /// Returns the number of occupied slots.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the arena holds no records.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Inserts a value built by `f`, which receives the assigned index.
    ///
    /// Records embed their own id, so the constructor needs the index
    /// before the record exists.
    pub fn insert_with<F>(&mut self, f: F) -> ArenaIndex
    where
        F: FnOnce(ArenaIndex) -> T,
    {
        self.len += 1;

        if let Some(free) = self.free_head {
            let entry = &mut self.entries[free as usize];
            match entry {
                Entry::Vacant {
                    next_free,
                    generation,
                } => {
                    let generation = *generation;
                    self.free_head = *next_free;
                    let idx = ArenaIndex::new(free, generation);
                    *entry = Entry::Occupied {
                        value: f(idx),
                        generation,
                    };
                    idx
                }
                Entry::Occupied { .. } => unreachable!("free list pointed at occupied slot"),
            }
        } else {
            let index = u32::try_from(self.entries.len()).expect("arena overflow");
            let idx = ArenaIndex::new(index, 0);
            let value = f(idx);
            self.entries.push(Entry::Occupied {
                value,
                generation: 0,
            });
            idx
        }
    }

    /// Inserts a value and returns its index.
    pub fn insert(&mut self, value: T) -> ArenaIndex {
        self.insert_with(|_| value)
    }

    /// Removes and returns the value at `index`.
    ///
    /// Returns `None` for stale or vacant handles.
    pub fn remove(&mut self, index: ArenaIndex) -> Option<T> {
        let entry = self.entries.get_mut(index.index as usize)?;
        match entry {
            Entry::Occupied { generation, .. } if *generation == index.generation => {
                let next_gen = generation.wrapping_add(1);
                let old = core::mem::replace(
                    entry,
                    Entry::Vacant {
                        next_free: self.free_head,
                        generation: next_gen,
                    },
                );
                self.free_head = Some(index.index);
                self.len -= 1;
                match old {
                    Entry::Occupied { value, .. } => Some(value),
                    Entry::Vacant { .. } => unreachable!(),
                }
            }
            _ => None,
        }
    }

    /// Returns a reference to the value at `index`, if live.
    #[must_use]
    pub fn get(&self, index: ArenaIndex) -> Option<&T> {
        match self.entries.get(index.index as usize)? {
            Entry::Occupied { value, generation } if *generation == index.generation => Some(value),
            _ => None,
        }
    }

    /// Returns a mutable reference to the value at `index`, if live.
    pub fn get_mut(&mut self, index: ArenaIndex) -> Option<&mut T> {
        match self.entries.get_mut(index.index as usize)? {
            Entry::Occupied { value, generation } if *generation == index.generation => Some(value),
            _ => None,
        }
    }

    /// Returns true if `index` resolves to a live record.
    #[must_use]
    pub fn contains(&self, index: ArenaIndex) -> bool {
        self.get(index).is_some()
    }

    /// Iterates over all live records.
    pub fn iter(&self) -> impl Iterator<Item = (ArenaIndex, &T)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, entry)| match entry {
                Entry::Occupied { value, generation } => Some((
                    ArenaIndex::new(u32::try_from(i).expect("arena overflow"), *generation),
                    value,
                )),
                Entry::Vacant { .. } => None,
            })
    }
}
