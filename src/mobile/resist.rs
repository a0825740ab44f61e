/// Damage elements tracked by the resistance array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Element {
    Physical,
    Fire,
    Cold,
    Poison,
    Energy,
}

impl Element {
    pub const COUNT: usize = 5;

    pub fn index(self) -> usize {
        match self {
            Element::Physical => 0,
            Element::Fire => 1,
            Element::Cold => 2,
            Element::Poison => 3,
            Element::Energy => 4,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Element::Physical),
            1 => Some(Element::Fire),
            2 => Some(Element::Cold),
            3 => Some(Element::Poison),
            4 => Some(Element::Energy),
            _ => None,
        }
    }
}

pub const RESIST_MIN: i32 = -100;
pub const RESIST_MAX: i32 = 100;

/// An offset to one element's resistance. Mutating a mobile's resistance mod
/// list always triggers recomputation of the summed array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResistanceMod {
    pub element: Element,
    pub offset: i32,
}

impl ResistanceMod {
    pub fn new(element: Element, offset: i32) -> Self {
        Self { element, offset }
    }
}

/// Sum a base array and mods, clamped per element.
pub fn compute_resistances(base: &[i32; Element::COUNT], mods: &[ResistanceMod]) -> [i32; Element::COUNT] {
    let mut totals = *base;
    for resist_mod in mods {
        let slot = &mut totals[resist_mod.element.index()];
        *slot = slot.saturating_add(resist_mod.offset);
    }
    for slot in totals.iter_mut() {
        *slot = (*slot).clamp(RESIST_MIN, RESIST_MAX);
    }
    totals
}
