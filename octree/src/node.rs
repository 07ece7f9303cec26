pub(crate) type Children<L> = [Option<Box<Node<L>>>; 8];

#[derive(Debug, Clone)]
pub(crate) enum Node<L> {
    Leaf(L),
    Branch(Children<L>),
}

/// `mask` selects the key bit of the current level.
#[inline]
pub(crate) fn key_to_index(key: &[usize; 3], mask: usize) -> usize {
    (((key[2] & mask != 0) as usize) << 2)
        | (((key[1] & mask != 0) as usize) << 1)
        | (key[0] & mask != 0) as usize
}

#[inline]
pub(crate) fn child_key(key: &[usize; 3], mask: usize, index: usize) -> [usize; 3] {
    let bit = |b: usize| if index & (1 << b) != 0 { mask } else { 0 };
    [key[0] | bit(0), key[1] | bit(1), key[2] | bit(2)]
}

pub(crate) fn find<'a, L>(mut children: &'a Children<L>, key: &[usize; 3], mut mask: usize) -> Option<&'a L> {
    loop {
        match children[key_to_index(key, mask)].as_deref()? {
            Node::Leaf(content) => break Some(content),
            Node::Branch(next) => {
                children = next;
                mask >>= 1;
            }
        }
    }
}

pub(crate) fn find_mut<'a, L>(
    children: &'a mut Children<L>,
    key: &[usize; 3],
    mask: usize,
) -> Option<&'a mut L> {
    match children[key_to_index(key, mask)].as_deref_mut()? {
        Node::Leaf(content) => Some(content),
        Node::Branch(next) => find_mut(next, key, mask >> 1),
    }
}

pub(crate) fn get_or_insert_with<'a, L, F>(
    children: &'a mut Children<L>,
    key: &[usize; 3],
    mask: usize,
    content: F,
) -> &'a mut L
where
    F: FnOnce() -> L,
{
    let slot = &mut children[key_to_index(key, mask)];
    if mask > 1 {
        let node = slot.get_or_insert_with(|| Box::new(Node::Branch(Default::default())));
        match &mut **node {
            Node::Branch(next) => get_or_insert_with(next, key, mask >> 1, content),
            Node::Leaf(_) => unreachable!("leaves only live at the last level"),
        }
    } else {
        let node = slot.get_or_insert_with(|| Box::new(Node::Leaf(content())));
        match &mut **node {
            Node::Leaf(content) => content,
            Node::Branch(_) => unreachable!("branches never live at the last level"),
        }
    }
}

/// Removes the leaf at `key`, pruning branches left empty.
pub(crate) fn remove<L>(children: &mut Children<L>, key: &[usize; 3], mask: usize) -> Option<L> {
    let index = key_to_index(key, mask);
    let (ret, prune) = match children[index].as_deref_mut()? {
        Node::Leaf(_) => (None, true),
        Node::Branch(next) => {
            let ret = remove(next, key, mask >> 1);
            (ret, next.iter().all(Option::is_none))
        }
    };
    if !prune {
        return ret;
    }
    match children[index].take().map(|node| *node) {
        Some(Node::Leaf(content)) => Some(content),
        _ => ret,
    }
}
