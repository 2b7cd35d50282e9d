//! Chargeable-power allocation.

/// Six-way split of one quantum's energy flows, in watt-hours.
///
/// The split conserves what went in: `export_here + import_here` equals the
/// here consumption, `export_neighbour + import_neighbour` the neighbour
/// consumption, and the three exports together equal the generation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Allocation {
    /// Generated energy nobody local consumed, sold to the grid.
    pub export_grid: f64,
    /// Generated energy consumed here.
    pub export_here: f64,
    /// Generated energy consumed by the neighbour.
    pub export_neighbour: f64,
    /// Grid energy consumed here.
    pub import_here: f64,
    /// Grid energy consumed by the neighbour.
    pub import_neighbour: f64,
}

impl Allocation {
    /// Accumulates another allocation into this one.
    pub fn add(&mut self, other: Allocation) {
        self.export_grid += other.export_grid;
        self.export_here += other.export_here;
        self.export_neighbour += other.export_neighbour;
        self.import_here += other.import_here;
        self.import_neighbour += other.import_neighbour;
    }
}

/// Splits one quantum's generation between the two consumers and the grid.
///
/// With surplus generation both consumers run entirely on generated power
/// and the excess goes to the grid. In deficit, generation is shared
/// between the consumers in proportion to their demand and the remainder
/// of each is imported. All inputs are non-negative watt-hours within the
/// quantum.
pub fn allocate(generated: f64, here: f64, neighbour: f64) -> Allocation {
    let consumed = here + neighbour;
    if consumed <= 0.0 {
        // Nobody local is drawing power: everything generated is sold.
        return Allocation {
            export_grid: generated,
            ..Allocation::default()
        };
    }
    if generated >= consumed {
        return Allocation {
            export_grid: generated - consumed,
            export_here: here,
            export_neighbour: neighbour,
            import_here: 0.0,
            import_neighbour: 0.0,
        };
    }
    let export_here = generated * here / consumed;
    let export_neighbour = generated * neighbour / consumed;
    Allocation {
        export_grid: 0.0,
        export_here,
        export_neighbour,
        import_here: here - export_here,
        import_neighbour: neighbour - export_neighbour,
    }
}
