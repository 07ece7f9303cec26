use crate::node::{child_key, Children, Node};

struct Frame<'a, L> {
    children: &'a Children<L>,
    key: [usize; 3],
    mask: usize,
    index: usize,
}

pub struct Iter<'a, L> {
    stack: Vec<Frame<'a, L>>,
}

impl<'a, L> Iter<'a, L> {
    pub(crate) fn new(root: &'a Children<L>, mask: usize) -> Self {
        Iter {
            stack: vec![Frame {
                children: root,
                key: [0; 3],
                mask,
                index: 0,
            }],
        }
    }
}

impl<'a, L> Iterator for Iter<'a, L> {
    type Item = ([usize; 3], &'a L);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let frame = self.stack.last_mut()?;
            if frame.index >= 8 {
                self.stack.pop();
                continue;
            }

            let index = frame.index;
            frame.index += 1;
            let (children, mask) = (frame.children, frame.mask);
            let child = match children[index].as_deref() {
                Some(child) => child,
                None => continue,
            };

            let key = child_key(&frame.key, mask, index);
            match child {
                Node::Leaf(content) => break Some((key, content)),
                Node::Branch(children) => {
                    let mask = mask >> 1;
                    self.stack.push(Frame {
                        children,
                        key,
                        mask,
                        index: 0,
                    })
                }
            }
        }
    }
}
