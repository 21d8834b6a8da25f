//! Logical concatenation of views.

use bytes::Bytes;

use super::View;
use crate::error::CompositeError;

#[derive(Debug)]
pub(super) struct Composite {
    members: Vec<View>,
    /// Logical start offset of each member; `starts[0] == 0`.
    starts: Vec<usize>,
    captured: usize,
    reported: usize,
}

impl Composite {
    pub(super) fn new(members: Vec<View>) -> Result<Self, CompositeError> {
        if members.is_empty() {
            return Err(CompositeError::NoMembers);
        }

        let mut starts = Vec::with_capacity(members.len());
        let mut captured = 0usize;
        let mut reported = 0usize;
        for (index, member) in members.iter().enumerate() {
            if member.captured_len() == 0 {
                return Err(CompositeError::EmptyMember { index });
            }
            starts.push(captured);
            captured = captured
                .checked_add(member.captured_len())
                .ok_or(CompositeError::LengthOverflow)?;
            reported = reported
                .checked_add(member.reported_len())
                .ok_or(CompositeError::LengthOverflow)?;
        }

        Ok(Self {
            members,
            starts,
            captured,
            reported,
        })
    }

    pub(super) fn members(&self) -> &[View] {
        &self.members
    }

    pub(super) fn captured_len(&self) -> usize {
        self.captured
    }

    pub(super) fn reported_len(&self) -> usize {
        self.reported
    }

    /// Index of the member holding logical `offset`.
    fn locate(&self, offset: usize) -> usize {
        match self.starts.binary_search(&offset) {
            Ok(index) => index,
            Err(index) => index - 1,
        }
    }

    /// Zero-copy bytes when the range lies inside a single member.
    pub(super) fn flat_slice(&self, offset: usize, length: usize) -> Option<Bytes> {
        let index = self.locate(offset);
        let member = &self.members[index];
        let local = offset - self.starts[index];
        if local + length <= member.captured_len() {
            member.flat_slice(local, length)
        } else {
            None
        }
    }

    pub(super) fn copy_unchecked(&self, offset: usize, out: &mut [u8]) {
        let mut index = self.locate(offset);
        let mut logical = offset;
        let mut written = 0;
        while written < out.len() {
            let member = &self.members[index];
            let local = logical - self.starts[index];
            let n = (member.captured_len() - local).min(out.len() - written);
            member.copy_unchecked(local, &mut out[written..written + n]);
            written += n;
            logical += n;
            index += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::error::CompositeError;
    use crate::tvb::{Endian, View};

    #[test]
    fn test_composite_reads_across_members() {
        let a = View::new(vec![1u8, 2, 3]);
        let b = View::new(vec![4u8]);
        let c = View::new(vec![5u8, 6, 7, 8]);
        let joined = View::composite([a, b, c]).unwrap();

        assert_eq!(joined.captured_len(), 8);
        assert_eq!(joined.get_u32(1, Endian::Big).unwrap(), 0x02030405);
        assert_eq!(joined.get_u8(3).unwrap(), 4);
        assert_eq!(joined.to_bytes().as_ref(), &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(joined.members().unwrap().len(), 3);
        assert!(joined.get_u16(7, Endian::Big).is_err());
    }

    #[test]
    fn test_composite_subset_inside_member_is_flat() {
        let a = View::new(vec![1u8, 2, 3]);
        let b = View::new(vec![4u8, 5, 6]);
        let joined = View::composite([a, b]).unwrap();

        let inner = joined.subset(3, 2).unwrap();
        assert_eq!(inner.get_bytes(0, ..).unwrap().as_ref(), &[4, 5]);

        let straddle = joined.subset(1, 4).unwrap();
        assert_eq!(straddle.get_bytes(0, ..).unwrap().as_ref(), &[2, 3, 4, 5]);
    }

    #[test]
    fn test_composite_of_subsets() {
        let frame = View::new((0u8..10).collect::<Vec<_>>());
        let head = frame.subset(0, 2).unwrap();
        let tail = frame.subset(8, ..).unwrap();
        let joined = View::composite([head, tail]).unwrap();
        assert_eq!(joined.to_bytes().as_ref(), &[0, 1, 8, 9]);
    }

    #[test]
    fn test_composite_rejects_empty_members() {
        assert_eq!(
            View::composite(Vec::new()).unwrap_err(),
            CompositeError::NoMembers
        );

        let empty = View::new(Vec::new());
        let full = View::new(vec![1u8]);
        assert_eq!(
            View::composite([full, empty]).unwrap_err(),
            CompositeError::EmptyMember { index: 1 }
        );
    }

    #[test]
    fn test_composite_reported_length_sums_members() {
        let a = View::with_reported_length(vec![1u8, 2], 6);
        let b = View::new(vec![3u8]);
        let joined = View::composite([a, b]).unwrap();
        assert_eq!(joined.captured_len(), 3);
        assert_eq!(joined.reported_len(), 7);
    }
}
