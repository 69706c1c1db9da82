use super::Aig;

/// Cone walks. All of them share the traversal-id marker: a walk bumps
/// the counter once and stamps every object it touches, so overlapping
/// cones are only visited once per call.
impl Aig {
    fn collect_cis_rec(&mut self, id: usize, supp: &mut Vec<usize>) {
        if self.trav_is_current(id) {
            return;
        }
        self.trav_set_current(id);
        if self.is_ci(id) {
            supp.push(id);
            return;
        }
        assert!(self.is_and(id));
        self.collect_cis_rec(self.fanin0(id), supp);
        self.collect_cis_rec(self.fanin1(id), supp);
    }

    /// Collects the combinational support (CI ids) of the given roots.
    /// CO roots are entered through their driver.
    pub fn collect_cis(&mut self, roots: &[usize], supp: &mut Vec<usize>) {
        supp.clear();
        self.trav_inc();
        self.trav_set_current(0);
        for &root in roots {
            let entry = if self.is_co(root) { self.fanin0(root) } else { root };
            self.collect_cis_rec(entry, supp);
        }
    }

    fn collect_ands_rec(&mut self, id: usize, nodes: &mut Vec<usize>) {
        if self.trav_is_current(id) {
            return;
        }
        self.trav_set_current(id);
        if self.is_ci(id) {
            return;
        }
        assert!(self.is_and(id));
        self.collect_ands_rec(self.fanin0(id), nodes);
        self.collect_ands_rec(self.fanin1(id), nodes);
        nodes.push(id);
    }

    /// Collects the AND nodes of the cone in topological order.
    pub fn collect_ands(&mut self, roots: &[usize], nodes: &mut Vec<usize>) {
        nodes.clear();
        self.trav_inc();
        self.trav_set_current(0);
        for &root in roots {
            let entry = if self.is_co(root) { self.fanin0(root) } else { root };
            self.collect_ands_rec(entry, nodes);
        }
    }

    /// Number of CIs in the cone of the roots.
    pub fn supp_size(&mut self, roots: &[usize]) -> usize {
        let mut supp = Vec::new();
        self.collect_cis(roots, &mut supp);
        supp.len()
    }

    /// Number of AND nodes in the cone of the roots.
    pub fn cone_size(&mut self, roots: &[usize]) -> usize {
        let mut nodes = Vec::new();
        self.collect_ands(roots, &mut nodes);
        nodes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diamond() -> (Aig, usize) {
        // f = (a & b) & (b & c)
        let mut aig = Aig::start(16);
        let a = aig.append_ci();
        let b = aig.append_ci();
        let c = aig.append_ci();
        let n1 = aig.append_and(a, b);
        let n2 = aig.append_and(b, c);
        let n3 = aig.append_and(n1, n2);
        let o = aig.append_co(n3);
        (aig, o.var())
    }

    #[test]
    fn support_of_cone() {
        let (mut aig, po) = diamond();
        let mut supp = Vec::new();
        aig.collect_cis(&[po], &mut supp);
        assert_eq!(supp.len(), 3);
        assert_eq!(aig.supp_size(&[po]), 3);
    }

    #[test]
    fn cone_nodes_are_topological() {
        let (mut aig, po) = diamond();
        let mut nodes = Vec::new();
        aig.collect_ands(&[po], &mut nodes);
        assert_eq!(nodes.len(), 3);
        for (i, &n) in nodes.iter().enumerate() {
            for &m in &nodes[i + 1..] {
                assert!(n < m || (aig.fanin0(m) != n && aig.fanin1(m) != n));
            }
        }
        assert_eq!(aig.cone_size(&[po]), 3);
    }

    #[test]
    fn shared_cone_counted_once() {
        let (mut aig, _) = diamond();
        let co0 = aig.co(0);
        let again = aig.cone_size(&[co0, co0]);
        assert_eq!(again, 3);
    }
}
