use rust_htslib::bam::record::{Cigar, CigarString, CigarStringView};

pub struct CigarUtils {}

impl CigarUtils {
    pub fn cigar_consumes_read_bases(cig: &Cigar) -> bool {
        // Consumes read bases
        match cig {
            Cigar::Match(_) | Cigar::Equal(_) | Cigar::Diff(_) | Cigar::Ins(_) | Cigar::SoftClip(_) => true,
            _ => false,
        }
    }

    pub fn cigar_consumes_reference_bases(cig: &Cigar) -> bool {
        // consumes reference bases
        match cig {
            Cigar::Match(_) | Cigar::Del(_) | Cigar::RefSkip(_) | Cigar::Equal(_) | Cigar::Diff(_) => true,
            _ => false,
        }
    }

    pub fn cigar_is_soft_clip(cig: &Cigar) -> bool {
        matches!(cig, Cigar::SoftClip(_))
    }

    pub fn is_clipping(cig: &Cigar) -> bool {
        matches!(cig, Cigar::SoftClip(_) | Cigar::HardClip(_))
    }

    /// True if the two operators are of the same enum variant (lengths may differ).
    pub fn cigar_elements_are_same_type(left: &Cigar, right: &Option<Cigar>) -> bool {
        match right {
            None => false,
            Some(right) => std::mem::discriminant(left) == std::mem::discriminant(right),
        }
    }

    /// Merge two same-typed cigar elements by summing their lengths. Returns None if the
    /// operators are not of the same type.
    pub fn combine_cigar_operators(left: &Cigar, right: &Cigar) -> Option<Cigar> {
        if std::mem::discriminant(left) != std::mem::discriminant(right) {
            return None;
        }
        Some(Self::cigar_from_element_and_length(left, left.len() + right.len()))
    }

    /**
     * Given a cigar string, soft clip up to leftClipEnd and soft clip starting at rightClipBegin
     * @param start initial index to clip within read bases, inclusive
     * @param stop final index to clip within read bases exclusive
     * @param clipping_operator      type of clipping -- must be either hard clip or soft clip
     */
    pub fn clip_cigar(cigar: &CigarStringView, start: u32, stop: u32, clipping_operator: Cigar) -> CigarString {
        let clip_left = start == 0;

        let mut new_cigar = Vec::new();

        let mut element_start = 0;
        for element in cigar.iter() {
            match element {
                // copy hard clips
                Cigar::HardClip(len) => new_cigar.push(Cigar::HardClip(*len)),
                Cigar::SoftClip(len)
                | Cigar::Diff(len)
                | Cigar::Equal(len)
                | Cigar::RefSkip(len)
                | Cigar::Del(len)
                | Cigar::Match(len)
                | Cigar::Ins(len)
                | Cigar::Pad(len) => {
                    let element_end = element_start
                        + if CigarUtils::cigar_consumes_read_bases(element) {
                            *len
                        } else {
                            0
                        };

                    // element precedes start or follows end of clip, copy it to new cigar
                    if element_end <= start || element_start >= stop {
                        // edge case: deletions at edge of clipping are meaningless and we skip them
                        if CigarUtils::cigar_consumes_read_bases(element)
                            || (element_start != start && element_start != stop)
                        {
                            new_cigar.push(element.clone())
                        }
                    } else {
                        // otherwise, some or all of the element is soft-clipped
                        let unclipped_length = if clip_left {
                            element_end.checked_sub(stop)
                        } else {
                            start.checked_sub(element_start)
                        };
                        match unclipped_length {
                            None => {
                                // Totally clipped
                                if CigarUtils::cigar_consumes_read_bases(element) {
                                    new_cigar.push(element.clone())
                                }
                            }
                            Some(unclipped_length) => {
                                let clipped_length = len.checked_sub(unclipped_length).unwrap();
                                if clip_left {
                                    new_cigar.push(CigarUtils::cigar_from_element_and_length(
                                        &clipping_operator,
                                        clipped_length,
                                    ));
                                    new_cigar.push(CigarUtils::cigar_from_element_and_length(
                                        element,
                                        unclipped_length,
                                    ));
                                } else {
                                    new_cigar.push(CigarUtils::cigar_from_element_and_length(
                                        element,
                                        unclipped_length,
                                    ));
                                    new_cigar.push(CigarUtils::cigar_from_element_and_length(
                                        &clipping_operator,
                                        clipped_length,
                                    ));
                                }
                            }
                        }
                    };
                    element_start = element_end
                }
            }
        }
        CigarString(new_cigar)
    }

    pub fn cigar_from_element_and_length(cigar: &Cigar, length: u32) -> Cigar {
        match cigar {
            Cigar::Pad(_) => Cigar::Pad(length),
            Cigar::Ins(_) => Cigar::Ins(length),
            Cigar::Match(_) => Cigar::Match(length),
            Cigar::Del(_) => Cigar::Del(length),
            Cigar::RefSkip(_) => Cigar::RefSkip(length),
            Cigar::Equal(_) => Cigar::Equal(length),
            Cigar::Diff(_) => Cigar::Diff(length),
            Cigar::SoftClip(_) => Cigar::SoftClip(length),
            Cigar::HardClip(_) => Cigar::HardClip(length),
        }
    }

    /// Total length of the cigar on the read (ALIGN + INSERT + SOFT_CLIP).
    pub fn read_length(cigar: &[Cigar]) -> u32 {
        cigar
            .iter()
            .filter(|c| Self::cigar_consumes_read_bases(c))
            .map(|c| c.len())
            .sum()
    }

    /// Total length of the cigar on the reference (ALIGN + DELETE).
    pub fn reference_length(cigar: &[Cigar]) -> u32 {
        cigar
            .iter()
            .filter(|c| Self::cigar_consumes_reference_bases(c))
            .map(|c| c.len())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combine_same_type() {
        let combined = CigarUtils::combine_cigar_operators(&Cigar::Match(3), &Cigar::Match(4)).unwrap();
        assert_eq!(combined, Cigar::Match(7));
    }

    #[test]
    fn test_combine_different_type() {
        assert!(CigarUtils::combine_cigar_operators(&Cigar::Match(3), &Cigar::Ins(4)).is_none());
    }

    #[test]
    fn test_read_and_reference_length() {
        let cigar = vec![Cigar::SoftClip(5), Cigar::Match(10), Cigar::Del(2), Cigar::Ins(3)];
        assert_eq!(CigarUtils::read_length(&cigar), 18);
        assert_eq!(CigarUtils::reference_length(&cigar), 12);
    }
}
